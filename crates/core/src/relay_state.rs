//! Lifecycle of a single client ↔ provider pairing.
//!
//! `RelaySession` is owned by exactly one relay task. It holds no sockets;
//! the task asks it what to do with each event and reports each transition.

use crate::error::RelayError;
use crate::frame;
use std::fmt;
use tracing::debug;

/// Phases of a relay session, in the order a healthy session walks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RelayPhase {
    Init,
    ClientConnected,
    UpstreamConnecting,
    UpstreamConnected,
    Configured,
    Closed,
}

impl RelayPhase {
    /// `Closed` is reachable from anywhere; otherwise phases only advance one
    /// step at a time.
    pub fn can_advance_to(self, next: RelayPhase) -> bool {
        use RelayPhase::*;
        matches!(
            (self, next),
            (Init, ClientConnected)
                | (ClientConnected, UpstreamConnecting)
                | (UpstreamConnecting, UpstreamConnected)
                | (UpstreamConnected, Configured)
        ) || (next == Closed && self != Closed)
    }
}

impl fmt::Display for RelayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayPhase::Init => "INIT",
            RelayPhase::ClientConnected => "CLIENT_CONNECTED",
            RelayPhase::UpstreamConnecting => "UPSTREAM_CONNECTING",
            RelayPhase::UpstreamConnected => "UPSTREAM_CONNECTED",
            RelayPhase::Configured => "CONFIGURED",
            RelayPhase::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal relay transition {from} -> {to}")]
pub struct TransitionError {
    pub from: RelayPhase,
    pub to: RelayPhase,
}

/// What the relay task must do with a text frame received from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFrameAction {
    /// Send the session configuration upstream, then forward the frame.
    ConfigureThenForward,
    /// Forward the frame to the client unchanged.
    Forward,
    /// The session is over; drop the frame.
    Drop,
}

/// Why a session reached [`RelayPhase::Closed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// The client went away cleanly.
    ClientClosed,
    /// Anything else, including a normal close by the provider.
    Failed(RelayError),
}

impl fmt::Display for CloseCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseCause::ClientClosed => f.write_str("client closed"),
            CloseCause::Failed(err) => write!(f, "{err}"),
        }
    }
}

/// Book-keeping for one relay session.
#[derive(Debug)]
pub struct RelaySession {
    phase: RelayPhase,
    config_sent: u32,
    close_cause: Option<CloseCause>,
}

impl Default for RelaySession {
    fn default() -> Self {
        Self::new()
    }
}

impl RelaySession {
    pub fn new() -> Self {
        Self {
            phase: RelayPhase::Init,
            config_sent: 0,
            close_cause: None,
        }
    }

    pub fn phase(&self) -> RelayPhase {
        self.phase
    }

    /// True once the provider socket is open and not yet closed.
    pub fn upstream_ready(&self) -> bool {
        matches!(
            self.phase,
            RelayPhase::UpstreamConnected | RelayPhase::Configured
        )
    }

    pub fn is_configured(&self) -> bool {
        self.phase == RelayPhase::Configured
    }

    pub fn is_closed(&self) -> bool {
        self.phase == RelayPhase::Closed
    }

    /// How many times the configuration has been handed to the provider.
    pub fn config_sent_count(&self) -> u32 {
        self.config_sent
    }

    pub fn close_cause(&self) -> Option<&CloseCause> {
        self.close_cause.as_ref()
    }

    pub fn advance(&mut self, next: RelayPhase) -> Result<(), TransitionError> {
        if !self.phase.can_advance_to(next) {
            return Err(TransitionError {
                from: self.phase,
                to: next,
            });
        }
        debug!(from = %self.phase, to = %next, "relay phase transition");
        self.phase = next;
        Ok(())
    }

    /// Decides what to do with a text frame from the provider.
    ///
    /// The first `session.created` seen while `UPSTREAM_CONNECTED` moves the
    /// session to `CONFIGURED` and asks for the configuration to be sent.
    /// Later duplicates are forwarded like any other frame.
    pub fn on_upstream_text(&mut self, text: &str) -> UpstreamFrameAction {
        if !self.upstream_ready() {
            return UpstreamFrameAction::Drop;
        }
        if self.phase == RelayPhase::UpstreamConnected && frame::is_session_created(text) {
            self.phase = RelayPhase::Configured;
            self.config_sent += 1;
            debug!(to = %self.phase, "provider session created");
            return UpstreamFrameAction::ConfigureThenForward;
        }
        UpstreamFrameAction::Forward
    }

    /// Client frames flow only while the provider socket is open.
    pub fn accepts_client_frames(&self) -> bool {
        self.upstream_ready()
    }

    /// Moves to `CLOSED`, keeping the first cause. Returns `false` if the
    /// session was already closed.
    pub fn close(&mut self, cause: CloseCause) -> bool {
        if self.is_closed() {
            return false;
        }
        debug!(from = %self.phase, %cause, "relay session closing");
        self.phase = RelayPhase::Closed;
        self.close_cause = Some(cause);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREATED: &str = r#"{"type":"session.created","session":{"id":"sess_1"}}"#;
    const DELTA: &str = r#"{"type":"response.audio.delta","delta":"QUJD"}"#;

    fn connected() -> RelaySession {
        let mut session = RelaySession::new();
        session.advance(RelayPhase::ClientConnected).unwrap();
        session.advance(RelayPhase::UpstreamConnecting).unwrap();
        session.advance(RelayPhase::UpstreamConnected).unwrap();
        session
    }

    #[test]
    fn healthy_session_walks_every_phase() {
        let mut session = connected();
        assert!(session.upstream_ready());
        assert!(!session.is_configured());

        assert_eq!(
            session.on_upstream_text(CREATED),
            UpstreamFrameAction::ConfigureThenForward
        );
        assert_eq!(session.phase(), RelayPhase::Configured);

        assert!(session.close(CloseCause::ClientClosed));
        assert_eq!(session.phase(), RelayPhase::Closed);
        assert_eq!(session.close_cause(), Some(&CloseCause::ClientClosed));
    }

    #[test]
    fn configuration_is_requested_exactly_once() {
        let mut session = connected();
        let actions: Vec<_> = [CREATED, DELTA, CREATED, CREATED]
            .iter()
            .map(|frame| session.on_upstream_text(frame))
            .collect();
        assert_eq!(
            actions,
            vec![
                UpstreamFrameAction::ConfigureThenForward,
                UpstreamFrameAction::Forward,
                UpstreamFrameAction::Forward,
                UpstreamFrameAction::Forward,
            ]
        );
        assert_eq!(session.config_sent_count(), 1);
    }

    #[test]
    fn frames_before_session_created_are_forwarded_without_configuring() {
        let mut session = connected();
        assert_eq!(session.on_upstream_text(DELTA), UpstreamFrameAction::Forward);
        assert_eq!(session.config_sent_count(), 0);
        assert_eq!(session.phase(), RelayPhase::UpstreamConnected);
    }

    #[test]
    fn nothing_flows_once_closed() {
        let mut session = connected();
        session.close(CloseCause::Failed(RelayError::UpstreamClosed));
        assert!(!session.accepts_client_frames());
        assert_eq!(session.on_upstream_text(CREATED), UpstreamFrameAction::Drop);
        assert_eq!(session.config_sent_count(), 0);
    }

    #[test]
    fn first_close_cause_wins() {
        let mut session = connected();
        assert!(session.close(CloseCause::Failed(RelayError::UpstreamError("reset".into()))));
        assert!(!session.close(CloseCause::ClientClosed));
        assert_eq!(
            session.close_cause(),
            Some(&CloseCause::Failed(RelayError::UpstreamError("reset".into())))
        );
    }

    #[test]
    fn closed_is_reachable_from_any_open_phase() {
        for phase in [
            RelayPhase::Init,
            RelayPhase::ClientConnected,
            RelayPhase::UpstreamConnecting,
            RelayPhase::UpstreamConnected,
            RelayPhase::Configured,
        ] {
            assert!(phase.can_advance_to(RelayPhase::Closed), "{phase}");
        }
        assert!(!RelayPhase::Closed.can_advance_to(RelayPhase::Closed));
    }

    #[test]
    fn phases_cannot_be_skipped() {
        let mut session = RelaySession::new();
        let err = session.advance(RelayPhase::UpstreamConnected).unwrap_err();
        assert_eq!(err.from, RelayPhase::Init);
        assert_eq!(err.to, RelayPhase::UpstreamConnected);
        assert!(!session.accepts_client_frames());
    }
}
