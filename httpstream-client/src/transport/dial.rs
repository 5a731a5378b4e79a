//! Opening connections.

use std::future::Future;
use std::io;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::MaybeTlsStream;
use crate::config::defaults;

/// Opens the byte stream a consumer talks HTTP over.
///
/// [`TcpDialer`] is what consumers use by default. Other implementations
/// can hand back any bidirectional stream, such as an in-memory pipe.
pub trait Dial: Send + Sync {
    /// The connected stream.
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Connect to `host:port`, performing a TLS handshake when `secure`.
    fn dial(
        &self,
        host: &str,
        port: u16,
        secure: bool,
    ) -> impl Future<Output = io::Result<Self::Io>> + Send;

    /// Whether `secure` connections can be made at all.
    fn supports_tls(&self) -> bool {
        true
    }
}

/// TCP dialer with optional rustls TLS.
///
/// The default TLS configuration is built lazily on the first secure dial
/// and shared by every clone.
#[derive(Clone)]
pub struct TcpDialer {
    tls: Arc<OnceLock<Option<Arc<ClientConfig>>>>,
    connect_timeout: Duration,
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TcpDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpDialer")
            .field("tls_configured", &self.tls.get().map(Option::is_some))
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl TcpDialer {
    pub fn new() -> Self {
        Self {
            tls: Arc::new(OnceLock::new()),
            connect_timeout: defaults::CONNECT_TIMEOUT,
        }
    }

    /// Use a custom rustls configuration for secure connections.
    pub fn with_tls_config(mut self, config: ClientConfig) -> Self {
        self.tls = Arc::new(OnceLock::from(Some(Arc::new(config))));
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn tls_config(&self) -> Option<Arc<ClientConfig>> {
        self.tls.get_or_init(default_tls_config).clone()
    }
}

#[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
fn default_tls_config() -> Option<Arc<ClientConfig>> {
    super::connector::default_tls_config().map(Arc::new)
}

#[cfg(not(any(feature = "tls-native-roots", feature = "tls-webpki-roots")))]
fn default_tls_config() -> Option<Arc<ClientConfig>> {
    None
}

impl Dial for TcpDialer {
    type Io = MaybeTlsStream;

    async fn dial(&self, host: &str, port: u16, secure: bool) -> io::Result<MaybeTlsStream> {
        let tcp = tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {host}:{port} timed out"),
                )
            })??;
        tcp.set_nodelay(true)?;

        if !secure {
            return Ok(MaybeTlsStream::Plain { stream: tcp });
        }

        let config = self.tls_config().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Unsupported,
                "no TLS configuration available",
            )
        })?;
        let server_name = ServerName::try_from(host.to_owned())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let stream = TlsConnector::from(config).connect(server_name, tcp).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(host, port, "TLS handshake complete");

        Ok(MaybeTlsStream::Tls {
            stream: Box::new(stream),
        })
    }

    fn supports_tls(&self) -> bool {
        self.tls_config().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_plain_dial() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"hello").await.unwrap();
        });

        let mut stream = TcpDialer::new().dial("127.0.0.1", port, false).await.unwrap();
        assert!(!stream.is_tls());

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_dial_is_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpDialer::new().dial("127.0.0.1", port, false).await;
        assert!(result.is_err());
    }
}
