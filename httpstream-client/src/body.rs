//! Response body decoding.
//!
//! Chunked bodies are read chunk by chunk and each chunk is handed to the
//! JSON framer. Other bodies must carry an allowed JSON media type; they are
//! decompressed according to `Content-Encoding` and streamed through the
//! framer until end of stream or `Content-Length` bytes.

use std::future::Future;
use std::io;

use bytes::{Bytes, BytesMut};
use httpstream_core::{ContentEncoding, Decompressor, JsonMimeTypes, JsonStreamDecoder, supported_encodings};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::defaults;
use crate::error::ConsumerError;
use crate::response::ResponseHead;
use crate::state::SharedState;
use crate::transport::Transport;

/// Read size for non-chunked bodies.
const READ_BUF: usize = 16 * 1024;

/// Largest chunk accepted from the server.
const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Body decoding settings.
#[derive(Clone, Debug)]
pub(crate) struct DecodeOptions {
    pub(crate) small_chunk_threshold: usize,
    pub(crate) mime_types: JsonMimeTypes,
    pub(crate) max_document_size: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            small_chunk_threshold: defaults::SMALL_CHUNK_THRESHOLD,
            mime_types: JsonMimeTypes::default(),
            max_document_size: defaults::MAX_DOCUMENT_SIZE,
        }
    }
}

/// How a body stopped being read.
#[derive(Debug)]
pub(crate) enum BodyOutcome {
    /// End of stream, terminal chunk, or `Content-Length` reached.
    Ended,
    /// Stop was requested.
    Stopped,
    /// The connection failed mid-body.
    Dropped(io::Error),
}

/// Decodes one response body into JSON values.
pub(crate) struct BodyDecoder<'a> {
    options: &'a DecodeOptions,
    state: &'a SharedState,
    parser: JsonStreamDecoder,
    delivered: u64,
}

impl<'a> BodyDecoder<'a> {
    pub(crate) fn new(options: &'a DecodeOptions, state: &'a SharedState) -> Self {
        Self {
            options,
            state,
            parser: JsonStreamDecoder::with_max_document(options.max_document_size),
            delivered: 0,
        }
    }

    /// Values emitted so far.
    pub(crate) fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Read the body behind `head` until it ends, fails, or stop is requested.
    ///
    /// Values are decoded even without a handler, except that chunked
    /// bodies require one.
    pub(crate) async fn run<S, F>(
        &mut self,
        transport: &mut Transport<S>,
        head: &ResponseHead,
        mut on_event: Option<&mut F>,
    ) -> Result<BodyOutcome, ConsumerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        F: FnMut(Value) + ?Sized,
    {
        if head.is_chunked() {
            if on_event.is_none() {
                return Err(ConsumerError::Stream(
                    "Chunked responses detected, but no block given to handle the chunks.".into(),
                ));
            }
            self.run_chunked(transport, &mut on_event).await
        } else {
            self.run_identity(transport, head, &mut on_event).await
        }
    }

    async fn run_chunked<S, F>(
        &mut self,
        transport: &mut Transport<S>,
        on_event: &mut Option<&mut F>,
    ) -> Result<BodyOutcome, ConsumerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        F: FnMut(Value) + ?Sized,
    {
        let state = self.state;
        loop {
            if !state.is_running() {
                return Ok(BodyOutcome::Stopped);
            }

            let line = match until_stopped(state, transport.read_line()).await {
                None => return Ok(BodyOutcome::Stopped),
                Some(Err(err)) => return Ok(BodyOutcome::Dropped(err)),
                Some(Ok(None)) => {
                    self.finish_documents(on_event);
                    return Ok(BodyOutcome::Ended);
                }
                Some(Ok(Some(line))) => line,
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let size = parse_chunk_size(line)?;
            if size == 0 {
                #[cfg(feature = "tracing")]
                tracing::debug!("terminal chunk received");
                self.finish_documents(on_event);
                return Ok(BodyOutcome::Ended);
            }

            let data = match until_stopped(state, transport.read_up_to(size)).await {
                None => return Ok(BodyOutcome::Stopped),
                Some(Err(err)) => return Ok(BodyOutcome::Dropped(err)),
                Some(Ok(data)) => data,
            };

            let data = if data.len() == size {
                if size <= self.options.small_chunk_threshold {
                    continue;
                }
                data
            } else {
                let rest = match until_stopped(state, transport.read_exactly(size - data.len())).await {
                    None => return Ok(BodyOutcome::Stopped),
                    Some(Err(err)) => return Ok(BodyOutcome::Dropped(err)),
                    Some(Ok(rest)) => rest,
                };
                reassemble(size, &data, &rest)
            };

            self.feed(&data, on_event)?;
        }
    }

    async fn run_identity<S, F>(
        &mut self,
        transport: &mut Transport<S>,
        head: &ResponseHead,
        on_event: &mut Option<&mut F>,
    ) -> Result<BodyOutcome, ConsumerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        F: FnMut(Value) + ?Sized,
    {
        if let Err(media) = self.options.mime_types.accepts(head.content_type()) {
            return Err(ConsumerError::Stream(format!(
                "Unhandled response MIME type {media}"
            )));
        }

        let encoding = ContentEncoding::from_header(head.content_encoding()).ok_or_else(|| {
            ConsumerError::Stream(format!(
                "Unhandled response Content-Encoding {} (supported: {})",
                head.content_encoding().unwrap_or_default(),
                supported_encodings()
            ))
        })?;
        let mut decompressor = encoding.decompressor();
        let mut remaining = head.content_length();

        let state = self.state;
        loop {
            if !state.is_running() {
                return Ok(BodyOutcome::Stopped);
            }

            let want = match remaining {
                Some(0) => break,
                Some(left) => usize::try_from(left).map_or(READ_BUF, |left| left.min(READ_BUF)),
                None => READ_BUF,
            };

            let data = match until_stopped(state, transport.read_up_to(want)).await {
                None => return Ok(BodyOutcome::Stopped),
                Some(Err(err)) => return Ok(BodyOutcome::Dropped(err)),
                Some(Ok(data)) => data,
            };
            if data.is_empty() {
                break;
            }
            if let Some(left) = remaining.as_mut() {
                *left = left.saturating_sub(data.len() as u64);
            }

            let plain = decompressor.decompress(&data)?;
            self.feed(&plain, on_event)?;
        }

        self.flush(&mut decompressor, on_event);
        Ok(BodyOutcome::Ended)
    }

    fn feed<F>(&mut self, data: &[u8], on_event: &mut Option<&mut F>) -> Result<(), ConsumerError>
    where
        F: FnMut(Value) + ?Sized,
    {
        if data.is_empty() {
            return Ok(());
        }
        let delivered = &mut self.delivered;
        self.parser.feed(data, |value| {
            *delivered += 1;
            if let Some(handler) = on_event.as_mut() {
                handler(value);
            }
        })?;
        Ok(())
    }

    /// Drain the decompressor and parser at end of body.
    ///
    /// Failures here are logged, not returned: the stream already ended.
    fn flush<F>(&mut self, decompressor: &mut Decompressor, on_event: &mut Option<&mut F>)
    where
        F: FnMut(Value) + ?Sized,
    {
        match decompressor.finish() {
            Ok(tail) => {
                if let Err(_err) = self.feed(&tail, on_event) {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %_err, "invalid JSON at end of body");
                }
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "compressed body ended early");
            }
        }

        self.finish_documents(on_event);
    }

    /// Emit a trailing bare number and drop any unfinished document.
    fn finish_documents<F>(&mut self, on_event: &mut Option<&mut F>)
    where
        F: FnMut(Value) + ?Sized,
    {
        let delivered = &mut self.delivered;
        let finished = self.parser.finish(|value| {
            *delivered += 1;
            if let Some(handler) = on_event.as_mut() {
                handler(value);
            }
        });
        match finished {
            Ok(false) => {}
            Ok(true) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("discarding incomplete JSON document at end of body");
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "invalid JSON at end of body");
            }
        }
    }
}

/// Race a read against a stop request. `None` means stop won.
async fn until_stopped<T, Fut>(state: &SharedState, read: Fut) -> Option<io::Result<T>>
where
    Fut: Future<Output = io::Result<T>>,
{
    tokio::select! {
        biased;
        _ = state.stop_requested() => None,
        result = read => Some(result),
    }
}

/// Parse a chunk-size line, ignoring chunk extensions.
fn parse_chunk_size(line: &str) -> Result<usize, ConsumerError> {
    let digits = line.split_once(';').map_or(line, |(size, _)| size).trim();
    let invalid = || ConsumerError::Protocol(format!("invalid chunk size line {line:?}"));

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let size = usize::from_str_radix(digits, 16).map_err(|_| invalid())?;
    if size > MAX_CHUNK_SIZE {
        return Err(ConsumerError::Protocol(format!(
            "chunk of {size} bytes exceeds the {MAX_CHUNK_SIZE} byte limit"
        )));
    }
    Ok(size)
}

fn reassemble(size: usize, head: &[u8], rest: &[u8]) -> Bytes {
    let mut whole = BytesMut::with_capacity(size);
    whole.extend_from_slice(head);
    whole.extend_from_slice(rest);
    whole.freeze()
}
