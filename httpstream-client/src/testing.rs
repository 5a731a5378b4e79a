//! Scripted in-memory servers for connector and consumer tests.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
use tokio::time::Instant;

use crate::transport::Dial;

/// What the server does for one dial.
pub(crate) enum Script {
    /// Refuse the connection.
    Refuse,
    /// Send the bytes, then close.
    Close(Vec<u8>),
    /// Send the bytes, then hold the connection until the client closes it.
    Open(Vec<u8>),
}

impl Script {
    pub(crate) fn close(bytes: impl Into<Vec<u8>>) -> Self {
        Script::Close(bytes.into())
    }

    pub(crate) fn open(bytes: impl Into<Vec<u8>>) -> Self {
        Script::Open(bytes.into())
    }
}

/// Build a raw HTTP/1.1 response.
pub(crate) fn response(status: &str, headers: &[&str], body: impl AsRef<[u8]>) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status}\r\n");
    for header in headers {
        out.push_str(header);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    let mut out = out.into_bytes();
    out.extend_from_slice(body.as_ref());
    out
}

/// Frame `data` as one chunk of a chunked body.
pub(crate) fn chunk(data: impl AsRef<[u8]>) -> Vec<u8> {
    let data = data.as_ref();
    let mut out = format!("{:x}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

/// A JSON object exactly `len` bytes long.
pub(crate) fn json_of_len(len: usize) -> String {
    let base = r#"{"pad":""}"#;
    assert!(len >= base.len());
    format!(r#"{{"pad":"{}"}}"#, "x".repeat(len - base.len()))
}

/// Serves one [`Script`] per dial and records what happened.
///
/// Dials beyond the script are refused.
pub(crate) struct ScriptedDialer {
    scripts: Mutex<VecDeque<Script>>,
    dials: Arc<Mutex<Vec<Instant>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl ScriptedDialer {
    pub(crate) fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            dials: Arc::default(),
            requests: Arc::default(),
        }
    }

    /// When each dial happened.
    pub(crate) fn dials(&self) -> Vec<Instant> {
        self.dials.lock().unwrap().clone()
    }

    pub(crate) fn dial_count(&self) -> usize {
        self.dials.lock().unwrap().len()
    }

    /// Requests received, in order.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Dial for ScriptedDialer {
    type Io = DuplexStream;

    async fn dial(&self, _host: &str, _port: u16, _secure: bool) -> io::Result<DuplexStream> {
        self.dials.lock().unwrap().push(Instant::now());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Refuse);

        let (bytes, hold) = match script {
            Script::Refuse => {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ));
            }
            Script::Close(bytes) => (bytes, false),
            Script::Open(bytes) => (bytes, true),
        };

        let (client, server) = duplex(1 << 16);
        tokio::spawn(serve(server, bytes, hold, self.requests.clone()));
        Ok(client)
    }
}

async fn serve(mut server: DuplexStream, bytes: Vec<u8>, hold: bool, requests: Arc<Mutex<Vec<String>>>) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.ends_with(b"\r\n\r\n") {
        match server.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    requests
        .lock()
        .unwrap()
        .push(String::from_utf8_lossy(&request).into_owned());

    if server.write_all(&bytes).await.is_err() {
        return;
    }
    if hold {
        // Wait for the client to hang up.
        while let Ok(n) = server.read(&mut buf).await {
            if n == 0 {
                break;
            }
        }
    }
}
