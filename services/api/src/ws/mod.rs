//! Realtime Interview Relay
//!
//! Bridges one browser WebSocket to one provider WebSocket per interview:
//!
//! - `session`: the per-connection relay task, from upgrade to teardown.
//! - `upstream`: building and opening the provider connection.

pub mod session;
pub mod upstream;

pub use session::ws_handler;
