//! livecount server binary
//!
//! Serves the presence hub, the embeddable client script, and a demo
//! page on one address.
//!
//! Run with: cargo run -- [--addr 0.0.0.0:10086] [--assets assets]
//!
//! The `PORT` environment variable overrides the port when `--addr` is
//! left at its default, which is how container platforms hand one out.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use livecount::server::config::DEFAULT_ADDR;
use livecount::{Error, PresenceServer, ServerConfig};

/// Real-time live viewer counter
#[derive(Debug, Parser)]
#[command(name = "livecount", version, about)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = DEFAULT_ADDR)]
    addr: String,

    /// Directory containing demo.html and livecount.js
    #[arg(long, default_value = "assets")]
    assets: PathBuf,
}

#[tokio::main]
async fn main() -> livecount::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let addr = resolve_addr(&cli.addr)?;

    let config = ServerConfig::default().bind(addr).asset_dir(cli.assets);
    let server = PresenceServer::new(config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting livecount");
    server.run_until(shutdown_signal()).await
}

/// Parse the listen address, applying the `PORT` override when the
/// flag was left at its default
fn resolve_addr(addr: &str) -> livecount::Result<SocketAddr> {
    let addr = match std::env::var("PORT") {
        Ok(port) if addr == DEFAULT_ADDR => format!("0.0.0.0:{port}"),
        _ => addr.to_string(),
    };
    addr.parse()
        .map_err(|_| Error::Config(format!("invalid listen address '{addr}'")))
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
