//! Buffered reads and writes over one open connection.

use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Longest header or chunk-size line accepted, terminator included.
const MAX_LINE_LEN: u64 = 64 * 1024;

/// One open connection, or none.
///
/// A closed transport returns `NotConnected` from every read and write.
/// [`close`](Transport::close) may be called any number of times.
#[derive(Debug)]
pub struct Transport<S> {
    reader: Option<BufReader<S>>,
    read_timeout: Option<Duration>,
    eof: bool,
}

impl<S> Default for Transport<S> {
    fn default() -> Self {
        Self::closed()
    }
}

impl<S> Transport<S> {
    /// A transport with no connection behind it.
    pub fn closed() -> Self {
        Self {
            reader: None,
            read_timeout: None,
            eof: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Whether the peer has closed its side.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a freshly connected stream.
    ///
    /// Every read fails with `TimedOut` when `read_timeout` elapses first.
    pub fn new(stream: S, read_timeout: Option<Duration>) -> Self {
        Self {
            reader: Some(BufReader::new(stream)),
            read_timeout,
            eof: false,
        }
    }

    fn reader(&mut self) -> io::Result<&mut BufReader<S>> {
        self.reader
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport is closed"))
    }

    /// Write all of `bytes` and flush.
    pub async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let writer = self.reader()?;
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    /// Read one line, terminator included. `None` at end of stream.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let timeout = self.read_timeout;
        let reader = self.reader()?;
        let mut line = Vec::new();
        let n = timed(timeout, reader.take(MAX_LINE_LEN).read_until(b'\n', &mut line)).await?;
        if n == 0 {
            self.eof = true;
            return Ok(None);
        }
        if n as u64 == MAX_LINE_LEN && line.last() != Some(&b'\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "line exceeds maximum length",
            ));
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Read at most `max` bytes, returning whatever one read produced.
    ///
    /// The result is shorter than `max` when less data was available, and
    /// empty only at end of stream.
    pub async fn read_up_to(&mut self, max: usize) -> io::Result<Bytes> {
        if max == 0 {
            return Ok(Bytes::new());
        }
        let timeout = self.read_timeout;
        let reader = self.reader()?;
        let available = timed(timeout, reader.fill_buf()).await?;
        let n = available.len().min(max);
        let bytes = Bytes::copy_from_slice(&available[..n]);
        reader.consume(n);
        if n == 0 {
            self.eof = true;
        }
        Ok(bytes)
    }

    /// Read exactly `n` bytes.
    ///
    /// Fails with `UnexpectedEof` if the stream ends first.
    pub async fn read_exactly(&mut self, n: usize) -> io::Result<Bytes> {
        let timeout = self.read_timeout;
        let reader = self.reader()?;
        let mut buf = vec![0u8; n];
        if let Err(err) = timed(timeout, reader.read_exact(&mut buf)).await {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                self.eof = true;
            }
            return Err(err);
        }
        Ok(Bytes::from(buf))
    }

    /// Shut down and drop the connection.
    ///
    /// Returns `false` when there was nothing to close.
    pub async fn close(&mut self) -> bool {
        let Some(mut reader) = self.reader.take() else {
            return false;
        };
        self.eof = false;
        // Peer may already be gone.
        let _ = reader.get_mut().shutdown().await;
        true
    }
}

async fn timed<T, F>(timeout: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read timed out"))?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_read_line_keeps_terminator() {
        let (client, mut server) = duplex(1024);
        server.write_all(b"HTTP/1.1 200 OK\r\nbody").await.unwrap();
        drop(server);

        let mut transport = Transport::new(client, None);
        assert_eq!(
            transport.read_line().await.unwrap().as_deref(),
            Some("HTTP/1.1 200 OK\r\n")
        );
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("body"));
        assert_eq!(transport.read_line().await.unwrap(), None);
        assert!(transport.is_eof());
    }

    #[tokio::test]
    async fn test_read_up_to_and_exactly() {
        let (client, mut server) = duplex(1024);
        server.write_all(b"0123456789").await.unwrap();

        let mut transport = Transport::new(client, None);
        assert_eq!(&transport.read_up_to(4).await.unwrap()[..], b"0123");
        assert_eq!(&transport.read_up_to(100).await.unwrap()[..], b"456789");

        server.write_all(b"abc").await.unwrap();
        drop(server);
        assert_eq!(&transport.read_exactly(2).await.unwrap()[..], b"ab");

        let err = transport.read_exactly(5).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(transport.is_eof());
    }

    #[tokio::test]
    async fn test_write_all_reaches_peer() {
        let (client, mut server) = duplex(1024);
        let mut transport = Transport::new(client, None);
        transport.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

        let mut buf = [0u8; 18];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"GET / HTTP/1.1\r\n\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let (client, _server) = duplex(1024);
        let mut transport = Transport::new(client, Some(Duration::from_secs(5)));
        let err = transport.read_line().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _server) = duplex(64);
        let mut transport = Transport::new(client, None);
        assert!(transport.is_open());
        assert!(transport.close().await);
        assert!(!transport.close().await);
        assert!(!transport.is_open());

        let mut never_opened: Transport<tokio::io::DuplexStream> = Transport::closed();
        assert!(!never_opened.close().await);
        let err = never_opened.read_line().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
