//! Byte-stream transport for stream connections.
//!
//! This module provides:
//!
//! - [`Dial`]: how a connection is opened; [`TcpDialer`] is the real one
//! - [`MaybeTlsStream`]: a TCP stream, optionally wrapped in rustls
//! - [`Transport`]: buffered line and byte reads over an opened stream
//!
//! # Feature Flags
//!
//! TLS support requires both a crypto provider and root certificates:
//!
//! - `tls-ring` / `tls-aws-lc` - Crypto providers
//! - `tls-native-roots` / `tls-webpki-roots` - Root certificates
//!
//! The `tls` feature (default) enables `tls-ring` + `tls-native-roots`.
//! A custom [`TlsClientConfig`] can always be supplied instead through
//! [`ConsumerBuilder::tls_config`](crate::ConsumerBuilder::tls_config).

mod conn;
mod connector;
mod dial;
mod stream;

pub use conn::Transport;
pub use connector::has_tls_support;
pub use dial::{Dial, TcpDialer};
pub use stream::MaybeTlsStream;

#[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
pub use connector::default_tls_config;

// Re-export rustls types that users might need for TLS configuration
pub use rustls::ClientConfig as TlsClientConfig;
