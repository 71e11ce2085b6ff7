//! Viewer connection endpoints
//!
//! Each accepted WebSocket becomes one endpoint running two tasks: a
//! reader that decodes join frames and drives hub membership, and a
//! writer that exclusively owns the socket's send half and drains the
//! endpoint's outbound queue.

pub mod endpoint;
pub mod state;
pub mod writer;

pub use endpoint::serve;
pub use state::{EndpointPhase, EndpointState, JoinAction};
