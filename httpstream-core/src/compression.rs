//! Response `Content-Encoding` handling.
//!
//! [`ContentEncoding`] is the closed set of body encodings a stream response
//! may use. Use [`ContentEncoding::decompressor()`] to get a streaming
//! [`Decompressor`] for the selected variant.

use crate::codec::Decompressor;

/// Supported response body encodings.
///
/// Variants other than `Identity` are only available when the matching
/// `compression-*` feature is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentEncoding {
    #[default]
    Identity,
    #[cfg(feature = "compression-gzip")]
    Gzip,
    #[cfg(feature = "compression-deflate")]
    Deflate,
    #[cfg(feature = "compression-bzip2")]
    Bzip2,
}

impl ContentEncoding {
    /// Parse from a `Content-Encoding` header value.
    ///
    /// An absent or empty header means identity. Returns `None` for encodings
    /// that are unknown or whose feature is disabled.
    pub fn from_header(value: Option<&str>) -> Option<Self> {
        match value.map(str::trim) {
            None | Some("") | Some("identity") => Some(Self::Identity),
            #[cfg(feature = "compression-gzip")]
            Some("gzip") | Some("x-gzip") => Some(Self::Gzip),
            #[cfg(feature = "compression-deflate")]
            Some("deflate") => Some(Self::Deflate),
            #[cfg(feature = "compression-bzip2")]
            Some("bzip2") | Some("x-bzip2") => Some(Self::Bzip2),
            _ => None,
        }
    }

    /// Get the header value string for this encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => "gzip",
            #[cfg(feature = "compression-deflate")]
            Self::Deflate => "deflate",
            #[cfg(feature = "compression-bzip2")]
            Self::Bzip2 => "bzip2",
        }
    }

    /// Returns true if this encoding is identity (no compression).
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    /// Create a fresh streaming decompressor for this encoding.
    pub fn decompressor(&self) -> Decompressor {
        Decompressor::new(*self)
    }
}

impl std::fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns a comma-separated list of the encodings this build can decode.
pub fn supported_encodings() -> String {
    let mut names = Vec::new();
    #[cfg(feature = "compression-gzip")]
    names.push("gzip");
    #[cfg(feature = "compression-deflate")]
    names.push("deflate");
    #[cfg(feature = "compression-bzip2")]
    names.push("bzip2");
    names.push("identity");
    names.join(", ")
}
