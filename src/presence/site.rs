//! Site aggregate
//!
//! Per-site state: the viewer count and the member map, guarded by one
//! lock so the two can never be observed out of step. Mutations are
//! `pub(super)`; only the hub's sequencer applies them.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::protocol::Frame;

/// Handle a site holds for one attached member endpoint
///
/// The site does not own the endpoint. It holds a sender for the
/// endpoint's bounded outbound queue and the token that stops the
/// endpoint's tasks when the membership is retired.
#[derive(Debug, Clone)]
pub struct SiteMember {
    /// Endpoint id, allocated by the server at accept time
    pub endpoint_id: u64,
    /// Display form of the peer address, for logging
    pub peer: String,
    /// Sender half of the endpoint's outbound queue
    pub sender: mpsc::Sender<Frame>,
    /// Cancelled when the endpoint must shut down
    pub cancel: CancellationToken,
}

impl SiteMember {
    /// Create a member handle for an endpoint
    pub fn new(
        endpoint_id: u64,
        peer: impl Into<String>,
        sender: mpsc::Sender<Frame>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            endpoint_id,
            peer: peer.into(),
            sender,
            cancel,
        }
    }
}

/// Outcome of removing a member from a site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The endpoint was not a member; nothing changed
    NotMember,
    /// Removed; `remaining` members are still attached
    Removed { remaining: usize },
}

/// A single site's aggregate state
///
/// Sites exist in the hub registry only while they have members; the
/// hub creates one on the first attach and reclaims it when the last
/// member leaves.
pub struct Site {
    key: String,
    state: RwLock<SiteState>,
}

#[derive(Debug, Default)]
struct SiteState {
    /// Viewer count; equals `members.len()` after every mutation
    count: usize,
    /// Attached members by endpoint id
    members: HashMap<u64, SiteMember>,
}

impl Site {
    pub(super) fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            state: RwLock::new(SiteState::default()),
        }
    }

    /// The site key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current viewer count
    pub async fn viewer_count(&self) -> usize {
        self.state.read().await.count
    }

    /// Whether the site currently has no members
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.members.is_empty()
    }

    /// Add a member and return the new count
    ///
    /// An attach for an endpoint that is already a member replaces its
    /// handle without changing the count.
    pub(super) async fn insert_member(&self, member: SiteMember) -> usize {
        let mut state = self.state.write().await;
        if state.members.insert(member.endpoint_id, member).is_none() {
            state.count += 1;
        }
        state.count
    }

    /// Remove a member, retiring its connection when `retire` is set
    ///
    /// Dropping the handle releases the site's hold on the member's
    /// outbound queue. With `retire` the member's cancel token fires as
    /// well, stopping its writer; without it the endpoint lives on to
    /// join another site.
    pub(super) async fn remove_member(&self, endpoint_id: u64, retire: bool) -> RemoveOutcome {
        let mut state = self.state.write().await;
        match state.members.remove(&endpoint_id) {
            None => RemoveOutcome::NotMember,
            Some(member) => {
                state.count = state.count.saturating_sub(1);
                if retire {
                    member.cancel.cancel();
                }
                RemoveOutcome::Removed {
                    remaining: state.count,
                }
            }
        }
    }

    /// Enqueue a frame onto every member's queue without blocking
    ///
    /// Returns the endpoint ids whose queues were full or gone; the
    /// caller sheds them after the pass.
    pub(super) async fn try_broadcast(&self, frame: &Frame) -> Vec<u64> {
        let state = self.state.read().await;
        let mut shed = Vec::new();
        for (endpoint_id, member) in &state.members {
            if member.sender.try_send(frame.clone()).is_err() {
                shed.push(*endpoint_id);
            }
        }
        shed
    }

    /// Send a shutdown notice to every member and cancel them all
    ///
    /// Members with full queues miss the notice but are still
    /// cancelled. Returns (notified, total).
    pub(super) async fn shutdown_members(&self, notice: &Frame) -> (usize, usize) {
        let state = self.state.read().await;
        let mut notified = 0;
        for member in state.members.values() {
            if member.sender.try_send(notice.clone()).is_ok() {
                notified += 1;
            }
            member.cancel.cancel();
        }
        (notified, state.members.len())
    }
}
