//! Core codec types for httpstream.
//!
//! This crate holds the transport-independent pieces of the streaming
//! client (`httpstream-client`):
//!
//! ## Modules
//!
//! - [`error`]: Decoding error type
//! - [`compression`]: `Content-Encoding` negotiation
//! - [`codec`]: Streaming decompressors
//! - [`json`]: Incremental JSON document framing
//! - [`mime`]: JSON media type allow-list

mod codec;
mod compression;
mod error;
mod json;
mod mime;

pub use codec::*;
pub use compression::*;
pub use error::*;
pub use json::*;
pub use mime::*;
