//! Shared Application State
//!
//! Everything here is read-only after startup. Relay sessions never share
//! mutable state with each other.

use crate::config::Config;
use interview_core::SessionUpdateEvent;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// The `session.update` frame, encoded once and injected into every session.
    pub session_update: Arc<String>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, serde_json::Error> {
        let session_update = SessionUpdateEvent::new(config.session.clone()).to_json()?;
        Ok(Self {
            config: Arc::new(config),
            session_update: Arc::new(session_update),
        })
    }
}
