//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default listen address, overridable with `--addr` or `PORT`
pub const DEFAULT_ADDR: &str = "0.0.0.0:10086";

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Interval between heartbeat pings
    ///
    /// Must stay strictly shorter than `read_timeout`, otherwise a
    /// quiet but healthy viewer gets timed out between pings.
    pub heartbeat_interval: Duration,

    /// Disconnect a viewer when nothing arrives for this long
    pub read_timeout: Duration,

    /// Upper bound on any single socket write
    pub write_timeout: Duration,

    /// Maximum inbound frame size in bytes
    pub max_frame_size: usize,

    /// Directory holding the demo page and client script template
    pub asset_dir: PathBuf,

    /// Notice sent to connected viewers when the process shuts down
    pub shutdown_notice: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.parse().unwrap(),
            heartbeat_interval: Duration::from_secs(54), // 90% of the read timeout
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            max_frame_size: 256, // Join frames are tiny
            asset_dir: PathBuf::from("assets"),
            shutdown_notice: "Server restarting, please reconnect shortly".to_string(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the heartbeat interval
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the read-inactivity timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the per-write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the maximum inbound frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the asset directory
    pub fn asset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.asset_dir = dir.into();
        self
    }

    /// Set the shutdown notice text
    pub fn shutdown_notice(mut self, notice: impl Into<String>) -> Self {
        self.shutdown_notice = notice.into();
        self
    }
}
