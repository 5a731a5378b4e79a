//! Local chunked JSON stream server.
//!
//! Serves one chunked HTTP/1.1 response per connection. Each event is a
//! padded JSON object in its own chunk, separated by small keep-alive
//! chunks. Requests without an `Auth` header get a 401 with a JSON
//! `message`.
//!
//! Usage:
//!   cargo run --bin mock-stream-server -- --interval-ms 200 --events-per-connection 20
//!
//! With `--events-per-connection` the server ends each response after that
//! many events, which exercises the consumer's reconnect path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Parser)]
#[command(about = "Serve a chunked JSON event stream")]
struct Args {
    /// Milliseconds between events.
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,

    /// End each response after this many events.
    #[arg(long)]
    events_per_connection: Option<u64>,
}

#[derive(Serialize)]
struct Event<'a> {
    id: u64,
    connection: u64,
    source: &'a str,
    text: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    httpstream_examples::init_tracing();
    let args = Arc::new(Args::parse());

    let addr = httpstream_examples::server_addr();
    let listener = TcpListener::bind(addr).await?;
    println!("Stream server listening on http://{addr}/stream");

    let next_id = Arc::new(AtomicU64::new(1));
    let mut connections = 0u64;
    loop {
        let (socket, peer) = listener.accept().await?;
        connections += 1;
        tracing::info!(%peer, connection = connections, "client connected");

        let args = args.clone();
        let next_id = next_id.clone();
        let connection = connections;
        tokio::spawn(async move {
            if let Err(err) = serve(socket, &args, &next_id, connection).await {
                tracing::info!(%peer, error = %err, "client disconnected");
            }
        });
    }
}

async fn serve(socket: TcpStream, args: &Args, next_id: &AtomicU64, connection: u64) -> anyhow::Result<()> {
    let mut socket = BufReader::new(socket);

    let mut authorized = false;
    loop {
        let mut line = String::new();
        if socket.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if line.to_ascii_lowercase().starts_with("auth:") {
            authorized = true;
        }
    }

    if !authorized {
        let body = serde_json::json!({ "message": "Auth header is required" }).to_string();
        let response = format!(
            "HTTP/1.1 401 Unauthorized\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}\r\n",
            body.len() + 2
        );
        socket.write_all(response.as_bytes()).await?;
        return Ok(());
    }

    socket
        .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nTransfer-Encoding: chunked\r\n\r\n")
        .await?;

    let mut sent = 0u64;
    loop {
        if args.events_per_connection.is_some_and(|max| sent >= max) {
            socket.write_all(b"0\r\n\r\n").await?;
            return Ok(());
        }

        let event = Event {
            id: next_id.fetch_add(1, Ordering::Relaxed),
            connection,
            source: "mock-stream-server",
            text: format!(
                "mock event {} delivered on connection {connection} by the local stream server",
                sent + 1
            ),
        };
        let mut json = serde_json::to_string(&event)?;
        json.push_str("\r\n");
        write_chunk(&mut socket, json.as_bytes()).await?;
        sent += 1;

        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        // keep-alive
        write_chunk(&mut socket, b"\r\n").await?;
    }
}

async fn write_chunk(socket: &mut BufReader<TcpStream>, data: &[u8]) -> std::io::Result<()> {
    let mut frame = format!("{:x}\r\n", data.len()).into_bytes();
    frame.extend_from_slice(data);
    frame.extend_from_slice(b"\r\n");
    socket.write_all(&frame).await?;
    socket.flush().await
}
