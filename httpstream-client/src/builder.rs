//! Consumer builder.
//!
//! Provides a fluent API for configuring and building a [`StreamConsumer`].

use std::time::Duration;

use httpstream_core::JsonMimeTypes;
use rustls::ClientConfig;

use crate::config::{BackoffPolicy, ConnectionConfig};
use crate::consumer::{ConsumerOptions, StopHook, StopReason, StreamConsumer};
use crate::error::ConsumerError;
use crate::transport::{Dial, TcpDialer};

/// Builder for creating a [`StreamConsumer`].
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use httpstream_client::{BackoffPolicy, ConnectionConfig, ConsumerBuilder};
///
/// let consumer = ConsumerBuilder::new(ConnectionConfig::new("stream.example.com", 80, "/abc"))
///     .backoff(BackoffPolicy::new().network_max(Duration::from_secs(8)))
///     .read_timeout(Duration::from_secs(90))
///     .build()?;
/// ```
pub struct ConsumerBuilder<D = TcpDialer> {
    config: ConnectionConfig,
    dialer: D,
    options: ConsumerOptions,
    on_stop: Option<StopHook>,
}

impl<D: std::fmt::Debug> std::fmt::Debug for ConsumerBuilder<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerBuilder")
            .field("config", &self.config)
            .field("dialer", &self.dialer)
            .field("options", &self.options)
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

impl ConsumerBuilder<TcpDialer> {
    /// Create a builder for the stream described by `config`.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            dialer: TcpDialer::new(),
            options: ConsumerOptions::default(),
            on_stop: None,
        }
    }

    /// Use a custom rustls configuration for `https` streams.
    ///
    /// Without one, a configuration is built from the enabled root
    /// certificate feature on first connect.
    pub fn tls_config(mut self, config: ClientConfig) -> Self {
        self.dialer = self.dialer.with_tls_config(config);
        self
    }

    /// Time allowed for the TCP connect of each attempt.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.dialer = self.dialer.connect_timeout(timeout);
        self
    }
}

impl<D> ConsumerBuilder<D> {
    /// Open connections through `dialer` instead of plain TCP.
    pub fn dialer<D2: Dial>(self, dialer: D2) -> ConsumerBuilder<D2> {
        ConsumerBuilder {
            config: self.config,
            dialer,
            options: self.options,
            on_stop: self.on_stop,
        }
    }

    /// Reopen the stream after the server closes it.
    ///
    /// Enabled by default.
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.options.auto_reconnect = enabled;
        self
    }

    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.options.backoff = policy;
        self
    }

    /// Drop the connection when no bytes arrive for `timeout`.
    ///
    /// A dropped connection is reopened like any other. By default reads
    /// wait indefinitely.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.options.read_timeout = Some(timeout);
        self
    }

    /// Chunks of at most this many bytes that arrive whole are skipped as
    /// keep-alive padding.
    ///
    /// Defaults to 100. Set to 0 to feed every chunk to the decoder.
    ///
    /// This also skips the short final piece of a document that the server
    /// split across chunks, which loses that document and can corrupt the
    /// ones after it. Use 0 for servers that split documents.
    pub fn small_chunk_threshold(mut self, bytes: usize) -> Self {
        self.options.decode.small_chunk_threshold = bytes;
        self
    }

    /// Fail with a decode error once a single JSON document grows past
    /// `bytes` while waiting for its end. Defaults to 16 MiB.
    pub fn max_document_size(mut self, bytes: usize) -> Self {
        self.options.decode.max_document_size = bytes;
        self
    }

    /// Replace the media types accepted for non-chunked bodies.
    pub fn mime_types(mut self, types: JsonMimeTypes) -> Self {
        self.options.decode.mime_types = types;
        self
    }

    /// Accept one more media type for non-chunked bodies.
    pub fn allow_mime_type(mut self, media: impl Into<String>) -> Self {
        let types = std::mem::take(&mut self.options.decode.mime_types);
        self.options.decode.mime_types = types.allow(media);
        self
    }

    /// Treat malformed JSON as a dropped connection instead of a failure.
    pub fn reconnect_on_decode_error(mut self, enabled: bool) -> Self {
        self.options.reconnect_on_decode_error = enabled;
        self
    }

    /// Called once when the consumer stops, with the reason.
    pub fn on_stop<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&StopReason) + Send + 'static,
    {
        self.on_stop = Some(Box::new(hook));
        self
    }
}

impl<D: Dial> ConsumerBuilder<D> {
    /// Build the consumer.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::Config`] for an invalid backoff policy, read
    /// timeout or document size limit, or when the stream needs TLS and the
    /// dialer has no TLS support.
    pub fn build(self) -> Result<StreamConsumer<D>, ConsumerError> {
        self.options
            .backoff
            .validate()
            .map_err(|msg| ConsumerError::Config(msg.into()))?;

        if self.options.read_timeout == Some(Duration::ZERO) {
            return Err(ConsumerError::Config(
                "read timeout must be greater than zero".into(),
            ));
        }

        if self.options.decode.max_document_size == 0 {
            return Err(ConsumerError::Config(
                "max document size must be greater than zero".into(),
            ));
        }

        if self.config.is_tls() && !self.dialer.supports_tls() {
            return Err(ConsumerError::Config(format!(
                "{} requires TLS, but no TLS configuration is available",
                self.config.host()
            )));
        }

        Ok(StreamConsumer::from_parts(
            self.config,
            self.dialer,
            self.options,
            self.on_stop,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StreamState;
    use crate::testing::ScriptedDialer;
    use std::io;
    use tokio::io::DuplexStream;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("stream.test", 80, "/hash")
    }

    struct PlainOnly;

    impl Dial for PlainOnly {
        type Io = DuplexStream;

        async fn dial(&self, _host: &str, _port: u16, _secure: bool) -> io::Result<DuplexStream> {
            Err(io::ErrorKind::ConnectionRefused.into())
        }

        fn supports_tls(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_builder_defaults() {
        let builder = ConsumerBuilder::new(config());
        assert!(builder.options.auto_reconnect);
        assert!(!builder.options.reconnect_on_decode_error);
        assert!(builder.options.read_timeout.is_none());
        assert_eq!(builder.options.decode.small_chunk_threshold, 100);
        assert_eq!(builder.options.decode.max_document_size, 16 * 1024 * 1024);
        assert!(builder.on_stop.is_none());
    }

    #[test]
    fn test_builder_setters() {
        let builder = ConsumerBuilder::new(config())
            .auto_reconnect(false)
            .read_timeout(Duration::from_secs(90))
            .small_chunk_threshold(0)
            .max_document_size(4096)
            .reconnect_on_decode_error(true)
            .allow_mime_type("application/vnd.feed+json")
            .on_stop(|_| {});

        assert!(!builder.options.auto_reconnect);
        assert_eq!(builder.options.read_timeout, Some(Duration::from_secs(90)));
        assert_eq!(builder.options.decode.small_chunk_threshold, 0);
        assert_eq!(builder.options.decode.max_document_size, 4096);
        assert!(builder.options.reconnect_on_decode_error);
        assert!(
            builder
                .options
                .decode
                .mime_types
                .accepts(Some("application/vnd.feed+json"))
                .is_ok()
        );
        assert!(builder.on_stop.is_some());
    }

    #[test]
    fn test_mime_types_replaces_defaults() {
        let builder = ConsumerBuilder::new(config())
            .mime_types(JsonMimeTypes::new(["application/x-feed"]));
        let types = &builder.options.decode.mime_types;
        assert!(types.accepts(Some("application/x-feed")).is_ok());
        assert!(types.accepts(Some("application/json")).is_err());
    }

    #[test]
    fn test_build_starts_idle() {
        let consumer = ConsumerBuilder::new(config())
            .dialer(ScriptedDialer::new([]))
            .build()
            .unwrap();
        assert_eq!(consumer.state(), StreamState::Idle);
        assert!(consumer.stop_reason().is_none());
        assert!(consumer.response_head().is_none());
        assert_eq!(consumer.config().host(), "stream.test");
    }

    #[test]
    fn test_build_rejects_invalid_backoff() {
        let err = ConsumerBuilder::new(config())
            .backoff(BackoffPolicy::new().network_step(Duration::ZERO))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConsumerError::Config(_)));
    }

    #[test]
    fn test_build_rejects_zero_read_timeout() {
        let err = ConsumerBuilder::new(config())
            .read_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConsumerError::Config("read timeout must be greater than zero".into())
        );
    }

    #[test]
    fn test_build_rejects_zero_document_limit() {
        let err = ConsumerBuilder::new(config())
            .max_document_size(0)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConsumerError::Config("max document size must be greater than zero".into())
        );
    }

    #[test]
    fn test_build_rejects_tls_without_support() {
        let err = ConsumerBuilder::new(config().use_tls(true))
            .dialer(PlainOnly)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConsumerError::Config(_)));

        let plain = ConsumerBuilder::new(config()).dialer(PlainOnly).build();
        assert!(plain.is_ok());
    }
}
