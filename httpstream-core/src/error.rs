//! Decoding errors shared by the body decoders.

/// Errors raised while turning response body bytes into JSON values.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The compressed byte stream was corrupt.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// The byte stream did not contain valid JSON.
    #[error("invalid JSON at byte {offset}: {message}")]
    Json { offset: u64, message: String },

    /// A single document grew past the configured limit.
    #[error("JSON document at byte {offset} exceeds {limit} bytes")]
    DocumentTooLarge { offset: u64, limit: usize },
}

impl DecodeError {
    /// Get the error message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            DecodeError::Decompression(msg) => msg,
            DecodeError::Json { message, .. } => message,
            DecodeError::DocumentTooLarge { .. } => "JSON document too large",
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        DecodeError::Decompression(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::Json {
            offset: 12,
            message: "expected value".into(),
        };
        assert_eq!(err.to_string(), "invalid JSON at byte 12: expected value");
        assert_eq!(err.message(), "expected value");
    }

    #[test]
    fn test_decode_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt deflate stream");
        let err = DecodeError::from(io);
        assert_eq!(err, DecodeError::Decompression("corrupt deflate stream".into()));
    }
}
