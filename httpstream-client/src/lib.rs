//! Resilient consumer for long-lived HTTP JSON streams.
//!
//! This crate opens a persistent HTTP/1.1 connection to a streaming endpoint,
//! authenticates with an `Auth` request header, and decodes the response body
//! into one [`serde_json::Value`] per top-level JSON document. Transient
//! failures are retried with backoff and dropped connections are reopened
//! automatically.
//!
//! ## Features
//!
//! - Plain TCP or TLS (rustls) connections
//! - Chunked and identity response bodies
//! - gzip, deflate and bzip2 `Content-Encoding`
//! - Separate backoff ladders for busy servers and network failures
//! - Cooperative stop from any task through a [`StopHandle`]
//!
//! ## Example
//!
//! ```ignore
//! use httpstream_client::{ConnectionConfig, StreamConsumer};
//!
//! let config = ConnectionConfig::from_url("https://stream.example.com/abc123")?
//!     .credentials("user", "api-key");
//!
//! let mut consumer = StreamConsumer::builder(config)
//!     .auto_reconnect(true)
//!     .on_stop(|reason| println!("stopped: {reason}"))
//!     .build()?;
//!
//! let handle = consumer.stop_handle();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     handle.stop();
//! });
//!
//! let reason = consumer
//!     .start(|event| println!("{event}"))
//!     .await?;
//! println!("{reason}");
//! ```
//!
//! ## Lifecycle
//!
//! A consumer moves through [`StreamState`] values:
//!
//! ```text
//! Idle -> Connecting -> Running -> Stopping -> Stopped
//!             ^            |
//!             +------------+   (reconnect)
//! ```
//!
//! [`StreamConsumer::start`] returns once the consumer reaches `Stopped`,
//! with the [`StopReason`]. The `on_stop` hook runs exactly once per run,
//! also when the run fails.

mod body;
mod builder;
pub mod config;
mod connect;
mod consumer;
mod error;
pub mod response;
mod state;
pub mod transport;

#[cfg(test)]
mod testing;

pub use builder::ConsumerBuilder;
pub use config::{
    defaults, Backoff, BackoffDecision, BackoffPolicy, ConnectionConfig, FailureKind,
};
pub use consumer::{StopReason, StreamConsumer};
pub use error::ConsumerError;
pub use response::ResponseHead;
pub use state::{StopHandle, StreamState};
pub use transport::{Dial, MaybeTlsStream, TcpDialer, TlsClientConfig, Transport};

// Re-export codec types used in the public API
pub use httpstream_core::{
    ContentEncoding, DecodeError, JsonMimeTypes, DEFAULT_JSON_MIME_TYPES,
};
pub use serde_json::Value;
