//! Opening a stream: request, response head, classification and retry.

use std::io;
use std::time::Duration;

use serde_json::Value;

use crate::config::{Backoff, BackoffDecision, BackoffPolicy, ConnectionConfig, FailureKind};
use crate::error::ConsumerError;
use crate::response::{HeadParser, ResponseHead};
use crate::state::{SharedState, StreamState};
use crate::transport::{Dial, Transport};

/// Permanent failure once the network ladder is exhausted.
const NETWORK_GIVE_UP: &str = "Connection failed due to a network error";

/// Lines scanned for a client-error message before giving up.
const MAX_ERROR_BODY_LINES: usize = 64;

/// Time allowed for reading a client-error body.
const ERROR_BODY_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a connect cycle that did not fail.
#[derive(Debug)]
pub(crate) enum ConnectOutcome {
    /// The transport is open and positioned at the start of the body.
    Connected(ResponseHead),
    /// Stop was requested before a connection was established.
    Aborted,
}

/// Result of one connection attempt.
#[derive(Debug)]
enum Attempt {
    Connected(ResponseHead),
    Retry { kind: FailureKind, give_up: String },
    Fatal(ConsumerError),
}

impl Attempt {
    fn network(_err: ConsumerError) -> Self {
        #[cfg(feature = "tracing")]
        tracing::debug!(error = %_err, "stream connection attempt failed");
        Attempt::Retry {
            kind: FailureKind::NetworkError,
            give_up: NETWORK_GIVE_UP.to_owned(),
        }
    }
}

/// Build the request bytes for `config`.
pub(crate) fn build_request(config: &ConnectionConfig) -> String {
    let mut request = format!("GET {} HTTP/1.1\r\n", config.request_target());
    request.push_str(&format!("Host: {}\r\n", config.host()));
    request.push_str(&format!("User-Agent: {}\r\n", config.get_user_agent()));
    request.push_str("Accept: */*\r\n");
    if let Some(auth) = config.auth() {
        request.push_str(&format!("Auth: {auth}\r\n"));
    }
    request.push_str("\r\n");
    request
}

/// Drives connection attempts until one succeeds, fails permanently, or
/// stop is requested.
pub(crate) struct Connector<'a, D> {
    pub(crate) config: &'a ConnectionConfig,
    pub(crate) dialer: &'a D,
    pub(crate) state: &'a SharedState,
    pub(crate) policy: &'a BackoffPolicy,
    pub(crate) read_timeout: Option<Duration>,
}

impl<D: Dial> Connector<'_, D> {
    /// Run one connect cycle with a fresh backoff.
    ///
    /// The caller must have moved the state to `Connecting`. On success the
    /// state is `Running` and `transport` holds the open connection.
    pub(crate) async fn connect(
        &self,
        transport: &mut Transport<D::Io>,
    ) -> Result<ConnectOutcome, ConsumerError> {
        let request = build_request(self.config);
        let mut backoff = Backoff::new(self.policy.clone());

        loop {
            transport.close().await;
            if self.state.get() != StreamState::Connecting {
                return Ok(ConnectOutcome::Aborted);
            }

            let delay = backoff.delay();
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.state.stop_requested() => return Ok(ConnectOutcome::Aborted),
                }
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(
                host = self.config.host(),
                port = self.config.port(),
                tls = self.config.is_tls(),
                attempt = backoff.attempts() + 1,
                "connecting to stream"
            );

            let attempt = tokio::select! {
                attempt = self.attempt(transport, request.as_bytes()) => attempt,
                _ = self.state.stop_requested() => {
                    transport.close().await;
                    return Ok(ConnectOutcome::Aborted);
                }
            };

            match attempt {
                Attempt::Connected(head) => {
                    if !self.state.mark_running() {
                        transport.close().await;
                        return Ok(ConnectOutcome::Aborted);
                    }
                    #[cfg(feature = "tracing")]
                    tracing::info!(
                        status = head.status(),
                        chunked = head.is_chunked(),
                        "stream connected"
                    );
                    return Ok(ConnectOutcome::Connected(head));
                }
                Attempt::Fatal(err) => {
                    transport.close().await;
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %err, "stream connection rejected");
                    return Err(err);
                }
                Attempt::Retry { kind, give_up } => match backoff.next(kind) {
                    BackoffDecision::Retry(_delay) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            kind = ?kind,
                            delay_ms = _delay.as_millis(),
                            "backing off before reconnecting"
                        );
                    }
                    BackoffDecision::GiveUp => {
                        transport.close().await;
                        #[cfg(feature = "tracing")]
                        tracing::warn!(kind = ?kind, "giving up on stream connection");
                        return Err(ConsumerError::Stream(give_up));
                    }
                },
            }
        }
    }

    async fn attempt(&self, transport: &mut Transport<D::Io>, request: &[u8]) -> Attempt {
        match self.open(transport, request).await {
            Ok(head) => classify(head, transport).await,
            Err(err) if err.is_retryable() => Attempt::network(err),
            Err(err) => Attempt::Fatal(err),
        }
    }

    /// Dial, send the request and read the response head.
    ///
    /// Every I/O failure here is a [`ConsumerError::Network`].
    async fn open(
        &self,
        transport: &mut Transport<D::Io>,
        request: &[u8],
    ) -> Result<ResponseHead, ConsumerError> {
        let io = self
            .dialer
            .dial(self.config.host(), self.config.port(), self.config.is_tls())
            .await?;
        *transport = Transport::new(io, self.read_timeout);
        transport.write_all(request).await?;
        Ok(read_head(transport).await?)
    }
}

/// Read header lines up to the blank line.
///
/// A connection closed before any byte arrived yields an empty head, which
/// classifies as refused. A close partway through is an I/O error.
async fn read_head<S>(transport: &mut Transport<S>) -> io::Result<ResponseHead>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let mut parser = HeadParser::default();
    loop {
        match transport.read_line().await? {
            Some(line) => {
                if parser.push_line(&line) {
                    return Ok(parser.finish());
                }
            }
            None if parser.is_empty() => return Ok(parser.finish()),
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed while reading response headers",
                ));
            }
        }
    }
}

async fn classify<S>(head: ResponseHead, transport: &mut Transport<S>) -> Attempt
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let Some(code) = head.status() else {
        return Attempt::Fatal(ConsumerError::Protocol("Socket connection refused".into()));
    };
    let refused = format!("Connection refused: {} {}", code, head.message())
        .trim_end()
        .to_owned();

    match code {
        200 => Attempt::Connected(head),
        399..500 if code != 420 => {
            let message = client_error_message(&head, transport)
                .await
                .unwrap_or(refused);
            Attempt::Fatal(ConsumerError::Stream(message))
        }
        _ => {
            #[cfg(feature = "tracing")]
            tracing::debug!(status = code, "stream server busy");
            Attempt::Retry {
                kind: FailureKind::ServerBusy,
                give_up: refused,
            }
        }
    }
}

/// Pull a `message` out of a client-error body.
///
/// Skips lines shorter than 10 bytes (chunk sizes, blank lines) and parses
/// the first longer one as a JSON object.
async fn client_error_message<S>(head: &ResponseHead, transport: &mut Transport<S>) -> Option<String>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    if head.content_length() == Some(0) {
        return None;
    }

    let scan = async {
        for _ in 0..MAX_ERROR_BODY_LINES {
            match transport.read_line().await {
                Ok(Some(line)) if line.len() >= 10 => return Some(line),
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return None,
            }
        }
        None
    };
    let line = tokio::time::timeout(ERROR_BODY_TIMEOUT, scan).await.ok()??;

    let body: Value = serde_json::from_str(line.trim()).ok()?;
    body.get("message")
        .and_then(Value::as_str)
        .map(str::to_owned)
}
