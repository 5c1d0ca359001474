//! Cosign relay binary.
//!
//! # Usage
//!
//! ```bash
//! # Start with self-signed certificate (development)
//! cosign-relay --bind 0.0.0.0:4433
//!
//! # Start with TLS certificate
//! cosign-relay --bind 0.0.0.0:4433 --cert cert.pem --key key.pem
//! ```

use clap::Parser;
use cosign_relay::{RelayConfig, RelayRuntimeConfig, Server};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Cosign rendezvous relay
#[derive(Parser, Debug)]
#[command(name = "cosign-relay")]
#[command(about = "Rendezvous relay for cosign document sessions")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4433")]
    bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long, requires = "key")]
    cert: Option<String>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long, requires = "cert")]
    key: Option<String>,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Maximum live sessions
    #[arg(long, default_value = "5000")]
    max_sessions: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Cosign relay starting");
    tracing::info!("Binding to {}", args.bind);

    let config = RelayRuntimeConfig {
        bind_address: args.bind,
        cert_path: args.cert,
        key_path: args.key,
        relay: RelayConfig { max_connections: args.max_connections, max_sessions: args.max_sessions },
    };

    let server = Server::bind(config)?;

    tracing::info!("Relay listening on {}", server.local_addr()?);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, shutting down"),
    }

    Ok(())
}
