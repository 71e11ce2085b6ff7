//! Hub commands
//!
//! Every structural mutation travels through one queue, consumed by the
//! hub's sequencer task. One queue for all sites keeps transitions
//! totally ordered, so two endpoints racing on the same site can never
//! interleave their count updates.

use tokio::sync::oneshot;

use super::site::SiteMember;

/// How a detach retires the member's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachKind {
    /// The endpoint is switching sites on a live connection. The site
    /// drops its queue handle but the writer keeps running for the
    /// attach that follows.
    Switching,
    /// The endpoint is done (disconnect, shed, shutdown); its tasks are
    /// cancelled as well.
    Final,
}

/// A structural mutation awaiting the sequencer
///
/// Each command carries a `done` channel; the sequencer fires it after
/// the mutation and its count broadcast have been applied, which is
/// what the hub's public operations await.
#[derive(Debug)]
pub enum HubCommand {
    /// Add a member to a site, creating the site if needed, then
    /// broadcast the new count to all of its members.
    Attach {
        site_key: String,
        member: SiteMember,
        done: oneshot::Sender<()>,
    },

    /// Remove a member from a site. Reclaims the site if it empties,
    /// otherwise broadcasts the lowered count.
    Detach {
        site_key: String,
        endpoint_id: u64,
        kind: DetachKind,
        done: oneshot::Sender<()>,
    },

    /// Fan an update with the given count out to a site's members.
    Broadcast {
        site_key: String,
        count: usize,
        done: oneshot::Sender<()>,
    },
}
