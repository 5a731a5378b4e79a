//! Streaming decompressors for response bodies.
//!
//! A [`Decompressor`] is selected once per connection from the response
//! `Content-Encoding` and then fed body bytes as they arrive off the wire.
//! Each call returns whatever plain bytes the input made available, so the
//! JSON framing code never needs to know which encoding is active.
//!
//! - gzip (requires `compression-gzip`)
//! - deflate, raw or zlib-wrapped (requires `compression-deflate`)
//! - bzip2 (requires `compression-bzip2`)

use bytes::Bytes;

#[cfg(any(
    feature = "compression-gzip",
    feature = "compression-deflate",
    feature = "compression-bzip2"
))]
use std::io::{self, Write};

use crate::compression::ContentEncoding;
use crate::error::DecodeError;

/// Incremental body decompressor.
pub struct Decompressor {
    encoding: ContentEncoding,
    inner: Inner,
}

enum Inner {
    Identity,
    #[cfg(feature = "compression-gzip")]
    Gzip(Box<flate2::write::GzDecoder<Vec<u8>>>),
    #[cfg(feature = "compression-deflate")]
    Deflate(DeflateState),
    #[cfg(feature = "compression-bzip2")]
    Bzip2(Box<bzip2::write::BzDecoder<Vec<u8>>>),
}

/// Servers disagree on whether HTTP `deflate` means zlib-wrapped or raw
/// deflate, so the first two bytes decide.
#[cfg(feature = "compression-deflate")]
enum DeflateState {
    Sniffing(Vec<u8>),
    Raw(Box<flate2::write::DeflateDecoder<Vec<u8>>>),
    Zlib(Box<flate2::write::ZlibDecoder<Vec<u8>>>),
}

impl Decompressor {
    /// Create a decompressor for the given encoding.
    pub fn new(encoding: ContentEncoding) -> Self {
        let inner = match encoding {
            ContentEncoding::Identity => Inner::Identity,
            #[cfg(feature = "compression-gzip")]
            ContentEncoding::Gzip => {
                Inner::Gzip(Box::new(flate2::write::GzDecoder::new(Vec::new())))
            }
            #[cfg(feature = "compression-deflate")]
            ContentEncoding::Deflate => Inner::Deflate(DeflateState::Sniffing(Vec::new())),
            #[cfg(feature = "compression-bzip2")]
            ContentEncoding::Bzip2 => {
                Inner::Bzip2(Box::new(bzip2::write::BzDecoder::new(Vec::new())))
            }
        };
        Self { encoding, inner }
    }

    /// The encoding this decompressor was built for.
    pub fn encoding(&self) -> ContentEncoding {
        self.encoding
    }

    /// Feed compressed bytes and return the plain bytes they produced.
    ///
    /// The result may be empty when the input only advanced internal state.
    pub fn decompress(&mut self, input: &[u8]) -> Result<Bytes, DecodeError> {
        match &mut self.inner {
            Inner::Identity => Ok(Bytes::copy_from_slice(input)),
            #[cfg(feature = "compression-gzip")]
            Inner::Gzip(decoder) => write_through(decoder.as_mut(), input),
            #[cfg(feature = "compression-deflate")]
            Inner::Deflate(state) => state.decompress(input),
            #[cfg(feature = "compression-bzip2")]
            Inner::Bzip2(decoder) => write_through(decoder.as_mut(), input),
        }
    }

    /// Signal end of input and return any remaining plain bytes.
    ///
    /// Fails if the compressed stream was truncated.
    pub fn finish(&mut self) -> Result<Bytes, DecodeError> {
        match &mut self.inner {
            Inner::Identity => Ok(Bytes::new()),
            #[cfg(feature = "compression-gzip")]
            Inner::Gzip(decoder) => finish_through(decoder.as_mut()),
            #[cfg(feature = "compression-deflate")]
            Inner::Deflate(state) => state.finish(),
            #[cfg(feature = "compression-bzip2")]
            Inner::Bzip2(decoder) => finish_through(decoder.as_mut()),
        }
    }
}

impl std::fmt::Debug for Decompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Decompressor").field(&self.encoding).finish()
    }
}

/// A write-side decoder that accumulates its output in a `Vec<u8>`.
#[cfg(any(
    feature = "compression-gzip",
    feature = "compression-deflate",
    feature = "compression-bzip2"
))]
trait SinkDecoder: Write {
    fn sink(&mut self) -> &mut Vec<u8>;
    fn try_finish(&mut self) -> io::Result<()>;
}

#[cfg(feature = "compression-gzip")]
impl SinkDecoder for flate2::write::GzDecoder<Vec<u8>> {
    fn sink(&mut self) -> &mut Vec<u8> {
        self.get_mut()
    }

    fn try_finish(&mut self) -> io::Result<()> {
        flate2::write::GzDecoder::try_finish(self)
    }
}

#[cfg(feature = "compression-deflate")]
impl SinkDecoder for flate2::write::DeflateDecoder<Vec<u8>> {
    fn sink(&mut self) -> &mut Vec<u8> {
        self.get_mut()
    }

    fn try_finish(&mut self) -> io::Result<()> {
        flate2::write::DeflateDecoder::try_finish(self)
    }
}

#[cfg(feature = "compression-deflate")]
impl SinkDecoder for flate2::write::ZlibDecoder<Vec<u8>> {
    fn sink(&mut self) -> &mut Vec<u8> {
        self.get_mut()
    }

    fn try_finish(&mut self) -> io::Result<()> {
        flate2::write::ZlibDecoder::try_finish(self)
    }
}

#[cfg(feature = "compression-bzip2")]
impl SinkDecoder for bzip2::write::BzDecoder<Vec<u8>> {
    fn sink(&mut self) -> &mut Vec<u8> {
        self.get_mut()
    }

    fn try_finish(&mut self) -> io::Result<()> {
        bzip2::write::BzDecoder::try_finish(self)
    }
}

#[cfg(any(
    feature = "compression-gzip",
    feature = "compression-deflate",
    feature = "compression-bzip2"
))]
fn write_through<D: SinkDecoder>(decoder: &mut D, input: &[u8]) -> Result<Bytes, DecodeError> {
    decoder.write_all(input)?;
    decoder.flush()?;
    Ok(Bytes::from(std::mem::take(decoder.sink())))
}

#[cfg(any(
    feature = "compression-gzip",
    feature = "compression-deflate",
    feature = "compression-bzip2"
))]
fn finish_through<D: SinkDecoder>(decoder: &mut D) -> Result<Bytes, DecodeError> {
    decoder.try_finish()?;
    Ok(Bytes::from(std::mem::take(decoder.sink())))
}

#[cfg(feature = "compression-deflate")]
impl DeflateState {
    fn decompress(&mut self, input: &[u8]) -> Result<Bytes, DecodeError> {
        if let DeflateState::Sniffing(pending) = self {
            pending.extend_from_slice(input);
            if pending.len() < 2 {
                return Ok(Bytes::new());
            }
            let head = std::mem::take(pending);
            *self = if is_zlib_header(head[0], head[1]) {
                DeflateState::Zlib(Box::new(flate2::write::ZlibDecoder::new(Vec::new())))
            } else {
                DeflateState::Raw(Box::new(flate2::write::DeflateDecoder::new(Vec::new())))
            };
            return self.decompress(&head);
        }

        match self {
            DeflateState::Raw(decoder) => write_through(decoder.as_mut(), input),
            DeflateState::Zlib(decoder) => write_through(decoder.as_mut(), input),
            DeflateState::Sniffing(_) => Ok(Bytes::new()),
        }
    }

    fn finish(&mut self) -> Result<Bytes, DecodeError> {
        match self {
            DeflateState::Sniffing(pending) if pending.is_empty() => Ok(Bytes::new()),
            DeflateState::Sniffing(_) => Err(DecodeError::Decompression(
                "deflate stream ended before its header".into(),
            )),
            DeflateState::Raw(decoder) => finish_through(decoder.as_mut()),
            DeflateState::Zlib(decoder) => finish_through(decoder.as_mut()),
        }
    }
}

/// RFC 1950: CM must be 8, CINFO at most 7, and CMF*256 + FLG divisible by 31.
#[cfg(feature = "compression-deflate")]
fn is_zlib_header(cmf: u8, flg: u8) -> bool {
    cmf & 0x0f == 8 && cmf >> 4 <= 7 && ((u16::from(cmf) << 8) | u16::from(flg)) % 31 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(any(feature = "compression-gzip", feature = "compression-deflate"))]
    use std::io::Write;

    const PAYLOAD: &[u8] = br#"{"id":1,"text":"hello"}
{"id":2,"text":"world"}
"#;

    /// Feed `data` in small slices and collect everything the decoder yields.
    fn decode_in_pieces(encoding: ContentEncoding, data: &[u8], piece: usize) -> Vec<u8> {
        let mut decompressor = encoding.decompressor();
        let mut out = Vec::new();
        for slice in data.chunks(piece) {
            out.extend_from_slice(&decompressor.decompress(slice).unwrap());
        }
        out.extend_from_slice(&decompressor.finish().unwrap());
        out
    }

    #[test]
    fn test_identity_passes_bytes_through() {
        let out = decode_in_pieces(ContentEncoding::Identity, PAYLOAD, 7);
        assert_eq!(out, PAYLOAD);
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_gzip_streaming_decode() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(PAYLOAD).unwrap();
        let compressed = encoder.finish().unwrap();

        let out = decode_in_pieces(ContentEncoding::Gzip, &compressed, 5);
        assert_eq!(out, PAYLOAD);
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_gzip_corrupt_input_is_an_error() {
        let mut decompressor = ContentEncoding::Gzip.decompressor();
        let result = decompressor.decompress(b"definitely not gzip data");
        assert!(matches!(result, Err(DecodeError::Decompression(_))));
    }

    #[cfg(feature = "compression-deflate")]
    #[test]
    fn test_raw_deflate_streaming_decode() {
        let mut encoder =
            flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(PAYLOAD).unwrap();
        let compressed = encoder.finish().unwrap();

        let out = decode_in_pieces(ContentEncoding::Deflate, &compressed, 1);
        assert_eq!(out, PAYLOAD);
    }

    #[cfg(feature = "compression-deflate")]
    #[test]
    fn test_zlib_wrapped_deflate_streaming_decode() {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(PAYLOAD).unwrap();
        let compressed = encoder.finish().unwrap();
        assert!(is_zlib_header(compressed[0], compressed[1]));

        let out = decode_in_pieces(ContentEncoding::Deflate, &compressed, 3);
        assert_eq!(out, PAYLOAD);
    }

    #[cfg(feature = "compression-bzip2")]
    #[test]
    fn test_bzip2_streaming_decode() {
        use std::io::Write;

        let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(PAYLOAD).unwrap();
        let compressed = encoder.finish().unwrap();

        let out = decode_in_pieces(ContentEncoding::Bzip2, &compressed, 9);
        assert_eq!(out, PAYLOAD);
    }
}
