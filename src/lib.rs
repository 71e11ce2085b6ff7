//! Real-time viewer presence counting over WebSockets.
//!
//! `livecount` tracks, per site key, how many viewers currently hold a
//! live connection, and pushes every change of that count to all of
//! the site's viewers. Sites come into existence on the first join and
//! are reclaimed the moment the last viewer leaves.
//!
//! # Architecture
//!
//! ```text
//!  browser ──ws──► PresenceServer ──► endpoint (reader ⇄ writer)
//!                                         │ attach / detach
//!                                         ▼
//!                                    PresenceHub ◄── sequencer task
//!                                         │
//!                                  Site { count, members }
//!                                         │ try_send fan-out
//!                                         ▼
//!                                 outbound queues ──► viewers
//! ```
//!
//! Fan-out never blocks: each viewer has a small bounded queue, and a
//! viewer whose queue is full is shed rather than allowed to stall the
//! rest of its site.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use livecount::{PresenceServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> livecount::Result<()> {
//!     let server = PresenceServer::new(ServerConfig::default());
//!     server
//!         .run_until(async {
//!             tokio::signal::ctrl_c().await.ok();
//!         })
//!         .await
//! }
//! ```

pub mod error;
pub mod presence;
pub mod protocol;
pub mod server;
pub mod session;

pub use error::{Error, Result};
pub use presence::{DetachKind, HubConfig, PresenceHub, Site, SiteMember};
pub use protocol::Frame;
pub use server::{PresenceServer, ServerConfig};
