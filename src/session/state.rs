//! Endpoint state machine
//!
//! Tracks one viewer connection from accept to close, including which
//! site it currently belongs to. Owned by the reader task; the writer
//! never touches it.

use std::time::Instant;

/// Endpoint lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointPhase {
    /// Connection accepted, no site joined yet
    Connected,
    /// First join seen, attach in flight
    Joining,
    /// Attached to a site
    Joined,
    /// Join for a different site seen, detach and attach in flight
    Switching,
    /// Connection tearing down
    Closing,
    /// Both tasks exited
    Closed,
}

/// What a join frame means given the endpoint's current site
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinAction {
    /// Blank key, or already on the requested site
    Ignore,
    /// First join: attach to the requested site
    Attach,
    /// Already elsewhere: detach from `previous`, then attach
    Switch { previous: String },
}

/// Per-connection endpoint state
#[derive(Debug)]
pub struct EndpointState {
    /// Unique endpoint id
    pub id: u64,
    /// Display form of the peer address
    pub peer: String,
    /// Current lifecycle phase
    pub phase: EndpointPhase,
    /// Site this endpoint belongs to, or intends to join
    site: Option<String>,
    /// When the connection was accepted
    pub connected_at: Instant,
}

impl EndpointState {
    /// Create state for a newly accepted connection
    pub fn new(id: u64, peer: impl Into<String>) -> Self {
        Self {
            id,
            peer: peer.into(),
            phase: EndpointPhase::Connected,
            site: None,
            connected_at: Instant::now(),
        }
    }

    /// Site the endpoint currently holds
    pub fn site(&self) -> Option<&str> {
        self.site.as_deref()
    }

    /// Record a join request and decide what it means
    ///
    /// The requested key is trimmed first, so whitespace padding cannot
    /// mint a separate site. The current-site reference moves to the
    /// requested site before any detach or attach is issued; a later
    /// join is judged against the intended site even while a transition
    /// is still in flight.
    pub fn on_join(&mut self, requested: &str) -> JoinAction {
        let requested = requested.trim();
        if requested.is_empty() {
            return JoinAction::Ignore;
        }

        match self.site.take() {
            None => {
                self.site = Some(requested.to_string());
                self.phase = EndpointPhase::Joining;
                JoinAction::Attach
            }
            Some(current) if current == requested => {
                self.site = Some(current);
                JoinAction::Ignore
            }
            Some(previous) => {
                self.site = Some(requested.to_string());
                self.phase = EndpointPhase::Switching;
                JoinAction::Switch { previous }
            }
        }
    }

    /// Mark the in-flight attach as applied
    pub fn complete_join(&mut self) {
        if matches!(self.phase, EndpointPhase::Joining | EndpointPhase::Switching) {
            self.phase = EndpointPhase::Joined;
        }
    }

    /// Begin teardown, yielding the site that needs a final detach
    pub fn begin_close(&mut self) -> Option<String> {
        self.phase = EndpointPhase::Closing;
        self.site.take()
    }

    /// Mark both tasks exited
    pub fn closed(&mut self) {
        self.phase = EndpointPhase::Closed;
    }

    /// How long the connection has been up
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}
