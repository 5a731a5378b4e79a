//! Shared helpers for the example binaries.

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

/// Returns the server address from the PORT env var, defaulting to 3000.
///
/// An unparsable PORT falls back to the default.
pub fn server_addr() -> SocketAddr {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(3000);
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Install a fmt subscriber filtered by `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
