//! Session-fatal failures of the relay and how each one is reported to the peer.

/// WebSocket close code for a normal closure (RFC 6455 §7.4.1).
pub const CLOSE_NORMAL: u16 = 1000;
/// The server hit an unexpected condition.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;
/// Application range: the relay has no provider credential configured.
pub const CLOSE_MISSING_CREDENTIAL: u16 = 4001;
/// Application range: the provider handshake failed or timed out.
pub const CLOSE_UPSTREAM_UNREACHABLE: u16 = 4002;

/// Every way a relay session can end other than a normal client disconnect.
///
/// All variants are session-fatal: the relay never resumes a session after
/// reporting one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// The client did not ask for a WebSocket upgrade.
    #[error("realtime upgrade required")]
    ProtocolMismatch,
    /// No provider credential is configured on the server.
    #[error("upstream credential is not configured")]
    MissingCredential,
    /// The provider connection could not be established.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),
    /// The provider connection failed after it was established.
    #[error("upstream error: {0}")]
    UpstreamError(String),
    /// The provider ended the session normally.
    #[error("upstream closed")]
    UpstreamClosed,
    /// The client connection failed or sent something unusable.
    #[error("client error: {0}")]
    ClientError(String),
}

impl RelayError {
    /// The close code sent to the surviving peer.
    ///
    /// For upstream-side failures that peer is the client. For
    /// [`RelayError::ClientError`] it is the provider.
    ///
    /// [`RelayError::ProtocolMismatch`] never reaches a socket: it is answered
    /// with HTTP 426 before any upgrade. Its code is only a fallback for
    /// callers that close a socket with it anyway.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::ProtocolMismatch => CLOSE_INTERNAL_ERROR,
            Self::MissingCredential => CLOSE_MISSING_CREDENTIAL,
            Self::UpstreamUnreachable(_) => CLOSE_UPSTREAM_UNREACHABLE,
            Self::UpstreamError(_) => CLOSE_INTERNAL_ERROR,
            Self::UpstreamClosed => CLOSE_NORMAL,
            Self::ClientError(_) => CLOSE_INTERNAL_ERROR,
        }
    }

    /// A short, stable reason string for the close frame.
    ///
    /// Kept free of provider detail so it always fits in the 123 bytes a
    /// close frame allows.
    pub fn close_reason(&self) -> &'static str {
        match self {
            Self::ProtocolMismatch => "ProtocolMismatch",
            Self::MissingCredential => "MissingCredential",
            Self::UpstreamUnreachable(_) => "UpstreamUnreachable",
            Self::UpstreamError(_) => "UpstreamError",
            Self::UpstreamClosed => "UpstreamClosed",
            Self::ClientError(_) => "ClientError",
        }
    }

    /// Whether the session ended without anything going wrong.
    pub fn is_normal(&self) -> bool {
        matches!(self, Self::UpstreamClosed)
    }

    /// Whether this error is reported as a close frame rather than an HTTP status.
    pub fn closes_socket(&self) -> bool {
        !matches!(self, Self::ProtocolMismatch)
    }
}
