//! HTTP server surface
//!
//! One listener serves three things: WebSocket upgrades for viewers,
//! the templated client script, and a demo page.

pub mod config;
mod http;
pub mod listener;
pub mod script;

pub use config::ServerConfig;
pub use listener::PresenceServer;
