//! Consume a JSON stream and print every event.
//!
//! Usage:
//!   # Against the local mock server (start it first):
//!   cargo run --bin mock-stream-server
//!   cargo run --bin consume -- http://localhost:3000/stream --username demo --api-key secret
//!
//!   # Stop after ten events:
//!   cargo run --bin consume -- http://localhost:3000/stream --max-events 10
//!
//! Press Ctrl-C to stop. Set RUST_LOG=httpstream_client=debug to see the
//! connection lifecycle.

use std::time::Duration;

use clap::Parser;
use httpstream_client::{ConnectionConfig, StreamConsumer};

#[derive(Debug, Parser)]
#[command(about = "Consume a long-lived HTTP JSON stream")]
struct Args {
    /// Stream URL, http or https.
    url: String,

    #[arg(long, default_value = "")]
    username: String,

    #[arg(long, default_value = "")]
    api_key: String,

    /// Stop when the server closes the stream instead of reconnecting.
    #[arg(long)]
    no_reconnect: bool,

    /// Stop after this many events.
    #[arg(long)]
    max_events: Option<u64>,

    /// Drop and reopen the connection after this many idle seconds.
    #[arg(long)]
    read_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    httpstream_examples::init_tracing();
    let args = Args::parse();

    let mut config = ConnectionConfig::from_url(&args.url)?;
    if !args.username.is_empty() {
        config = config.credentials(&args.username, &args.api_key);
    }

    let mut builder = StreamConsumer::builder(config)
        .auto_reconnect(!args.no_reconnect)
        .on_stop(|reason| tracing::info!(%reason, "consumer stopped"));
    if let Some(secs) = args.read_timeout {
        builder = builder.read_timeout(Duration::from_secs(secs));
    }
    let mut consumer = builder.build()?;

    let handle = consumer.stop_handle();
    let ctrl_c = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.stop();
        }
    });

    let mut received = 0u64;
    let reason = consumer
        .start(|event| {
            received += 1;
            println!("{event}");
            if args.max_events.is_some_and(|max| received >= max) {
                handle.stop();
            }
        })
        .await?;

    eprintln!(
        "{reason} after {} events and {} reconnects",
        consumer.events_delivered(),
        consumer.reconnects()
    );
    Ok(())
}
