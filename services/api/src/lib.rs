//! Interview Relay Library Crate
//!
//! This library contains the realtime interview relay service: configuration,
//! application state, the HTTP surface, and the WebSocket relay itself. The
//! binaries under `bin/` are thin wrappers around it.

pub mod audio_utils;
pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod ws;
