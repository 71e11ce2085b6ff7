//! Presence server
//!
//! Binds the listener, owns the hub and its sequencer task, and serves
//! the HTTP surface until shut down.

use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::error::Result;
use crate::presence::{HubConfig, PresenceHub};
use crate::server::config::ServerConfig;
use crate::server::http::{self, AppState};

/// Viewer presence server
pub struct PresenceServer {
    config: ServerConfig,
    hub: Arc<PresenceHub>,
}

impl PresenceServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self::with_hub_config(config, HubConfig::default())
    }

    /// Create a new server with custom hub configuration
    pub fn with_hub_config(config: ServerConfig, hub_config: HubConfig) -> Self {
        Self {
            config,
            hub: Arc::new(PresenceHub::with_config(hub_config)),
        }
    }

    /// Get a reference to the presence hub
    pub fn hub(&self) -> &Arc<PresenceHub> {
        &self.hub
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the server fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    ///
    /// When `shutdown` resolves, connected viewers receive the
    /// configured shutdown notice and their connections are closed
    /// before this returns.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Presence server listening");

        // Spawn the hub's command sequencer
        let sequencer_handle = self.hub.spawn_sequencer();

        let state = Arc::new(AppState {
            hub: Arc::clone(&self.hub),
            config: self.config.clone(),
            next_endpoint_id: AtomicU64::new(1),
        });
        let app = http::router(state);
        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        );

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                self.hub.begin_shutdown(&self.config.shutdown_notice).await;
                Ok(())
            }
            result = async { server.await } => result.map_err(Into::into),
        };

        // Stop the sequencer on shutdown
        sequencer_handle.abort();

        result
    }
}
