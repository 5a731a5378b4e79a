//! Configuration for stream consumers.
//!
//! - [`ConnectionConfig`]: Where to connect and how to authenticate
//! - [`BackoffPolicy`]: Reconnection delays for busy servers and network failures
//! - [`defaults`]: Default values used by [`ConsumerBuilder`](crate::ConsumerBuilder)

mod backoff;
mod connection;

pub use backoff::{Backoff, BackoffDecision, BackoffPolicy, FailureKind};
pub use connection::{ConnectionConfig, default_user_agent};

/// Default consumer settings.
pub mod defaults {
    use std::time::Duration;

    pub use super::backoff::defaults::*;

    /// Reconnect automatically when a healthy stream drops.
    pub const AUTO_RECONNECT: bool = true;

    /// Time allowed for the TCP connect to complete.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Complete chunks of this many bytes or fewer are not decoded.
    ///
    /// Streaming servers send short keep-alive chunks between events; this
    /// skips them without running the JSON parser. `0` decodes every chunk.
    ///
    /// A server that splits one document across chunks can send a short
    /// final piece. Skipping it leaves the document unfinished, and the
    /// documents after it are then lost or fail to parse. Use `0` against
    /// such servers.
    pub const SMALL_CHUNK_THRESHOLD: usize = 100;

    /// Largest single JSON document buffered while waiting for its end.
    pub const MAX_DOCUMENT_SIZE: usize = httpstream_core::DEFAULT_MAX_DOCUMENT_SIZE;

    /// Malformed JSON or compressed data ends the run instead of reconnecting.
    pub const RECONNECT_ON_DECODE_ERROR: bool = false;
}
