//! Stream consumer error types.
//!
//! This module provides [`ConsumerError`], the error type returned when a
//! stream run ends abnormally.

use httpstream_core::DecodeError;

/// Errors that end a stream run.
///
/// I/O failures while opening a connection are classified as
/// [`ConsumerError::Network`], which [`is_retryable`](Self::is_retryable)
/// reports as retryable. The connector retries those internally, so they
/// only surface as a [`ConsumerError::Stream`] once the backoff ladder is
/// exhausted.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConsumerError {
    /// Transport-level failure (refused, reset, timeout, TLS handshake).
    #[error("network error: {0}")]
    Network(String),

    /// The server spoke malformed HTTP (status line, chunk size).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The stream was rejected or can no longer be reopened.
    #[error("{0}")]
    Stream(String),

    /// The body held corrupt compressed data or invalid JSON.
    #[error("decode error: {0}")]
    Decode(String),

    /// The consumer was configured inconsistently.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ConsumerError {
    /// Get the error message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            ConsumerError::Network(msg)
            | ConsumerError::Protocol(msg)
            | ConsumerError::Stream(msg)
            | ConsumerError::Decode(msg)
            | ConsumerError::Config(msg) => msg,
        }
    }

    /// Returns whether another connection attempt may succeed.
    ///
    /// ```
    /// use httpstream_client::ConsumerError;
    ///
    /// assert!(ConsumerError::Network("connection reset".into()).is_retryable());
    /// assert!(!ConsumerError::Stream("not found".into()).is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConsumerError::Network(_))
    }
}

impl From<DecodeError> for ConsumerError {
    fn from(err: DecodeError) -> Self {
        ConsumerError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for ConsumerError {
    fn from(err: std::io::Error) -> Self {
        ConsumerError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_error_displays_bare_message() {
        let err = ConsumerError::Stream("not found".into());
        assert_eq!(err.to_string(), "not found");
        assert_eq!(err.message(), "not found");
    }

    #[test]
    fn test_decode_error_conversion() {
        let err = ConsumerError::from(DecodeError::Decompression("bad header".into()));
        assert_eq!(
            err,
            ConsumerError::Decode("decompression failed: bad header".into())
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_io_error_is_retryable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = ConsumerError::from(io);
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "network error: reset by peer");
    }
}
