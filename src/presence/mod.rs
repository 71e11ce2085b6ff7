//! Presence hub for per-site viewer counting
//!
//! The hub maps site keys to site aggregates and funnels every
//! membership transition through a single sequencer task, so attaches
//! and detaches from all connections apply in one total order.
//!
//! # Architecture
//!
//! ```text
//!  endpoints                    PresenceHub
//!  ─────────                 ┌─────────────────────────────┐
//!  attach ──┐                │ sites: RwLock<HashMap<      │
//!  detach ──┼── commands ──► │   String, Arc<Site>>>       │
//!           │   (mpsc)       │                             │
//!           │                │ sequencer task:             │
//!           │                │   mutate one site,          │
//!           │                │   then fan out the count    │
//!           │                └──────────────┬──────────────┘
//!           │                               │ try_send
//!           │                ┌──────────────┼──────────────┐
//!           │                ▼              ▼              ▼
//!           │          [queue ep1]    [queue ep2]    [queue ep3]
//!           │                │              │              │
//!           └─── ack ◄──     ▼              ▼              ▼
//!                        writer 1       writer 2       writer 3
//! ```
//!
//! # Backpressure
//!
//! Fan-out never blocks. Each member owns a small bounded queue; a full
//! queue sheds that member instead of stalling the rest of the site.
//! A shed member leaves through the same removal path as a detach, so
//! the count stays equal to the member set.

pub mod command;
pub mod config;
pub mod hub;
pub mod site;

pub use command::{DetachKind, HubCommand};
pub use config::HubConfig;
pub use hub::PresenceHub;
pub use site::{RemoveOutcome, Site, SiteMember};
