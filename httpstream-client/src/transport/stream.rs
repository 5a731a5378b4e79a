//! Plain or TLS-wrapped TCP stream.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

pin_project! {
    /// A connected TCP stream, wrapped in TLS when the target uses `https`.
    #[project = MaybeTlsStreamProj]
    pub enum MaybeTlsStream {
        /// Unencrypted TCP.
        Plain {
            #[pin]
            stream: TcpStream,
        },
        /// TCP with a completed rustls handshake.
        Tls {
            #[pin]
            stream: Box<TlsStream<TcpStream>>,
        },
    }
}

impl MaybeTlsStream {
    pub fn is_tls(&self) -> bool {
        matches!(self, MaybeTlsStream::Tls { .. })
    }
}

impl std::fmt::Debug for MaybeTlsStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaybeTlsStream::Plain { stream } => f.debug_tuple("Plain").field(stream).finish(),
            MaybeTlsStream::Tls { stream } => f
                .debug_tuple("Tls")
                .field(stream.get_ref().0)
                .finish(),
        }
    }
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeTlsStreamProj::Plain { stream } => stream.poll_read(cx, buf),
            MaybeTlsStreamProj::Tls { stream } => stream.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            MaybeTlsStreamProj::Plain { stream } => stream.poll_write(cx, buf),
            MaybeTlsStreamProj::Tls { stream } => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeTlsStreamProj::Plain { stream } => stream.poll_flush(cx),
            MaybeTlsStreamProj::Tls { stream } => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeTlsStreamProj::Plain { stream } => stream.poll_shutdown(cx),
            MaybeTlsStreamProj::Tls { stream } => stream.poll_shutdown(cx),
        }
    }
}
