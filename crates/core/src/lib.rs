//! Interview Relay Core
//!
//! Protocol-level building blocks for the realtime interview relay. Nothing in
//! this crate performs I/O: it describes the frames the relay inspects, the
//! single `session.update` message it injects, the lifecycle of one relay
//! session, and the errors that end it.

pub mod error;
pub mod frame;
pub mod relay_state;
pub mod session_config;

pub use error::RelayError;
pub use relay_state::{CloseCause, RelayPhase, RelaySession, UpstreamFrameAction};
pub use session_config::{SessionConfig, SessionUpdateEvent};
