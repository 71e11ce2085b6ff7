//! Broadcast protocol
//!
//! JSON frames exchanged between viewers and the server. Clients send
//! `join` frames; the server answers with `update` frames carrying the
//! current viewer count and, on teardown, a `shutdown` notice.

pub mod frame;

pub use frame::Frame;
