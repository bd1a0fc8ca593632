//! Manages the lifecycle of one relay session.
//!
//! A session is a single task that owns both sockets. It reads whichever side
//! has a frame ready, forwards it, and tears both sides down as soon as either
//! one ends. Because the task awaits every send before reading again, a slow
//! peer back-pressures the other side instead of growing a queue.

use super::upstream;
use crate::{handlers::ApiError, state::AppState};
use axum::{
    extract::{
        State,
        ws::{
            CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade,
            rejection::WebSocketUpgradeRejection,
        },
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use interview_core::{
    CloseCause, RelayError, RelayPhase, RelaySession, UpstreamFrameAction,
    error::CLOSE_NORMAL,
};
use std::{sync::Arc, time::Duration};
use tokio_tungstenite::tungstenite::{
    self,
    protocol::{CloseFrame as WsCloseFrame, Message as WsMessage, frame::coding::CloseCode},
};
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

/// Maximum WebSocket frame size accepted from the browser (1 MB).
const MAX_CLIENT_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size accepted from the browser (4 MB).
const MAX_CLIENT_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

type ClientSink = SplitSink<WebSocket, Message>;
type ClientStream = SplitStream<WebSocket>;
type UpstreamSink = SplitSink<upstream::UpstreamStream, WsMessage>;
type UpstreamSource = SplitStream<upstream::UpstreamStream>;

/// Axum handler that upgrades the interview connection and starts a relay session.
///
/// Requests that do not ask for a WebSocket upgrade are rejected with
/// `426 Upgrade Required` before any upstream resources are touched.
pub async fn ws_handler(
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let ws = upgrade.map_err(|rejection| {
        debug!(%rejection, "Relay endpoint called without a WebSocket upgrade");
        RelayError::ProtocolMismatch
    })?;

    Ok(ws
        .max_frame_size(MAX_CLIENT_FRAME_SIZE)
        .max_message_size(MAX_CLIENT_MESSAGE_SIZE)
        .on_upgrade(move |socket| run_session(socket, state)))
}

/// Drives one relay session from upgrade to teardown.
#[instrument(name = "relay_session", skip_all, fields(session_id = %Uuid::new_v4()))]
async fn run_session(socket: WebSocket, state: Arc<AppState>) {
    let config = &state.config;
    let mut session = RelaySession::new();
    advance(&mut session, RelayPhase::ClientConnected);
    info!("Interview client connected");

    let (mut client_tx, mut client_rx) = socket.split();

    // The credential is checked per session so a misconfigured server fails
    // each interview loudly instead of refusing to start.
    let Some(api_key) = config.openai_api_key.as_ref() else {
        let err = RelayError::MissingCredential;
        error!(error = %err, "Cannot open upstream session");
        session.close(CloseCause::Failed(err.clone()));
        close_client(&mut client_tx, &err, config.close_timeout).await;
        return;
    };

    advance(&mut session, RelayPhase::UpstreamConnecting);
    let connect = upstream::connect(config, api_key);
    tokio::pin!(connect);

    // Client frames that arrive during the handshake have nowhere to go.
    let upstream_result = loop {
        tokio::select! {
            result = &mut connect => break result,
            msg = client_rx.next() => match msg {
                Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                    debug!("Dropping client frame received before upstream is ready");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client left before the upstream handshake finished");
                    session.close(CloseCause::ClientClosed);
                    let _ = tokio::time::timeout(config.close_timeout, client_tx.close()).await;
                    return;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Client socket failed during upstream handshake");
                    session.close(CloseCause::Failed(RelayError::ClientError(e.to_string())));
                    return;
                }
            },
        }
    };

    let upstream = match upstream_result {
        Ok(stream) => stream,
        Err(err) => {
            error!(error = %err, "Upstream connection failed");
            session.close(CloseCause::Failed(err.clone()));
            close_client(&mut client_tx, &err, config.close_timeout).await;
            return;
        }
    };
    advance(&mut session, RelayPhase::UpstreamConnected);
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let mut relay = Relay {
        session,
        session_update: state.session_update.as_str(),
        client_tx: &mut client_tx,
        upstream_tx: &mut upstream_tx,
        forward_timeout: config.forward_timeout,
        client_frames: 0,
        upstream_frames: 0,
    };
    let cause = relay.pump(&mut client_rx, &mut upstream_rx).await;
    let (client_frames, upstream_frames) = (relay.client_frames, relay.upstream_frames);
    let mut session = relay.session;
    let configured = session.is_configured();
    session.close(cause);

    let Some(cause) = session.close_cause() else {
        return;
    };
    teardown(cause, &mut client_tx, &mut upstream_tx, config.close_timeout).await;

    let config_sent = session.config_sent_count();
    match cause {
        CloseCause::ClientClosed => info!(
            client_frames,
            upstream_frames,
            configured,
            config_sent,
            "Relay session finished"
        ),
        CloseCause::Failed(err) if err.is_normal() => info!(
            client_frames,
            upstream_frames,
            configured,
            config_sent,
            "Relay session ended by upstream"
        ),
        CloseCause::Failed(err) => warn!(
            error = %err,
            client_frames,
            upstream_frames,
            configured,
            config_sent,
            "Relay session terminated"
        ),
    }
}

fn advance(session: &mut RelaySession, next: RelayPhase) {
    if let Err(e) = session.advance(next) {
        error!(error = %e, "Relay state machine out of step");
    }
}

/// The forwarding half of a session, alive while both sockets are open.
struct Relay<'a> {
    session: RelaySession,
    session_update: &'a str,
    client_tx: &'a mut ClientSink,
    upstream_tx: &'a mut UpstreamSink,
    forward_timeout: Duration,
    client_frames: u64,
    upstream_frames: u64,
}

impl Relay<'_> {
    /// Forwards frames in both directions until one side ends, and returns why.
    async fn pump(
        &mut self,
        client_rx: &mut ClientStream,
        upstream_rx: &mut UpstreamSource,
    ) -> CloseCause {
        loop {
            let step = tokio::select! {
                msg = client_rx.next() => self.on_client(msg).await,
                msg = upstream_rx.next() => self.on_upstream(msg).await,
            };
            if let Err(cause) = step {
                return cause;
            }
        }
    }

    async fn on_client(
        &mut self,
        msg: Option<Result<Message, axum::Error>>,
    ) -> Result<(), CloseCause> {
        let outbound = match msg {
            Some(Ok(Message::Text(text))) => {
                trace!(bytes = text.len(), "client -> upstream");
                WsMessage::Text(text.to_string().into())
            }
            Some(Ok(Message::Binary(data))) => {
                trace!(bytes = data.len(), "client -> upstream (binary)");
                WsMessage::Binary(data)
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => return Ok(()),
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "Client sent close frame");
                return Err(CloseCause::ClientClosed);
            }
            None => return Err(CloseCause::ClientClosed),
            Some(Err(e)) => {
                return Err(CloseCause::Failed(RelayError::ClientError(e.to_string())));
            }
        };

        if !self.session.accepts_client_frames() {
            debug!("Dropping client frame, upstream is not open");
            return Ok(());
        }
        self.send_upstream(outbound).await?;
        self.client_frames += 1;
        Ok(())
    }

    async fn on_upstream(
        &mut self,
        msg: Option<Result<WsMessage, tungstenite::Error>>,
    ) -> Result<(), CloseCause> {
        let inbound = match msg {
            Some(Ok(WsMessage::Text(text))) => {
                match self.session.on_upstream_text(text.as_str()) {
                    UpstreamFrameAction::ConfigureThenForward => {
                        self.send_upstream(WsMessage::Text(self.session_update.to_string().into()))
                            .await?;
                        info!("Provider session created, configuration sent");
                    }
                    UpstreamFrameAction::Forward => {}
                    UpstreamFrameAction::Drop => return Ok(()),
                }
                trace!(bytes = text.len(), "upstream -> client");
                Message::Text(text.to_string().into())
            }
            Some(Ok(WsMessage::Binary(data))) => {
                trace!(bytes = data.len(), "upstream -> client (binary)");
                Message::Binary(data)
            }
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {
                return Ok(());
            }
            Some(Ok(WsMessage::Close(frame))) => {
                return Err(CloseCause::Failed(upstream_close_error(frame.as_ref())));
            }
            None => return Err(CloseCause::Failed(RelayError::UpstreamClosed)),
            Some(Err(e)) => {
                return Err(CloseCause::Failed(RelayError::UpstreamError(e.to_string())));
            }
        };

        self.send_client(inbound).await?;
        self.upstream_frames += 1;
        Ok(())
    }

    /// A provider that stops reading for `forward_timeout` ends the session.
    async fn send_upstream(&mut self, msg: WsMessage) -> Result<(), CloseCause> {
        match tokio::time::timeout(self.forward_timeout, self.upstream_tx.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CloseCause::Failed(RelayError::UpstreamError(e.to_string()))),
            Err(_) => Err(CloseCause::Failed(RelayError::UpstreamError(format!(
                "send stalled for {}ms",
                self.forward_timeout.as_millis()
            )))),
        }
    }

    /// A browser that stops reading for `forward_timeout` ends the session.
    async fn send_client(&mut self, msg: Message) -> Result<(), CloseCause> {
        match tokio::time::timeout(self.forward_timeout, self.client_tx.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CloseCause::Failed(RelayError::ClientError(e.to_string()))),
            Err(_) => Err(CloseCause::Failed(RelayError::ClientError(format!(
                "send stalled for {}ms",
                self.forward_timeout.as_millis()
            )))),
        }
    }
}

/// A normal or "going away" close from the provider is a normal end of the
/// interview; any other code is reported as an upstream error.
fn upstream_close_error(frame: Option<&WsCloseFrame>) -> RelayError {
    match frame {
        None => RelayError::UpstreamClosed,
        Some(frame) if matches!(frame.code, CloseCode::Normal | CloseCode::Away) => {
            RelayError::UpstreamClosed
        }
        Some(frame) => RelayError::UpstreamError(format!(
            "closed with code {}: {}",
            u16::from(frame.code),
            frame.reason.as_str()
        )),
    }
}

/// Closes both sockets, each bounded by `timeout`.
async fn teardown(
    cause: &CloseCause,
    client_tx: &mut ClientSink,
    upstream_tx: &mut UpstreamSink,
    timeout: Duration,
) {
    match cause {
        CloseCause::ClientClosed => {
            close_upstream(upstream_tx, CLOSE_NORMAL, "client closed", timeout).await;
            let _ = tokio::time::timeout(timeout, client_tx.close()).await;
        }
        CloseCause::Failed(err @ RelayError::ClientError(_)) => {
            close_upstream(upstream_tx, err.close_code(), err.close_reason(), timeout).await;
            let _ = tokio::time::timeout(timeout, client_tx.close()).await;
        }
        CloseCause::Failed(err) => {
            close_client(client_tx, err, timeout).await;
            let _ = tokio::time::timeout(timeout, upstream_tx.close()).await;
        }
    }
}

/// Sends a diagnostic close frame to the browser.
async fn close_client(client_tx: &mut ClientSink, err: &RelayError, timeout: Duration) {
    let frame = CloseFrame {
        code: err.close_code(),
        reason: Utf8Bytes::from_static(err.close_reason()),
    };
    match tokio::time::timeout(timeout, client_tx.send(Message::Close(Some(frame)))).await {
        Ok(Ok(())) => debug!(code = err.close_code(), "Closed client socket"),
        Ok(Err(e)) => debug!(error = %e, "Client socket already gone"),
        Err(_) => warn!(?timeout, "Timed out closing client socket"),
    }
    let _ = tokio::time::timeout(timeout, client_tx.close()).await;
}

async fn close_upstream(
    upstream_tx: &mut UpstreamSink,
    code: u16,
    reason: &'static str,
    timeout: Duration,
) {
    let frame = WsCloseFrame {
        code: CloseCode::from(code),
        reason: tungstenite::Utf8Bytes::from_static(reason),
    };
    match tokio::time::timeout(timeout, upstream_tx.send(WsMessage::Close(Some(frame)))).await {
        Ok(Ok(())) => debug!(code, "Closed upstream socket"),
        Ok(Err(e)) => debug!(error = %e, "Upstream socket already gone"),
        Err(_) => warn!(?timeout, "Timed out closing upstream socket"),
    }
    let _ = tokio::time::timeout(timeout, upstream_tx.close()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_core::error::CLOSE_INTERNAL_ERROR;

    #[test]
    fn normal_upstream_close_is_not_an_error() {
        let frame = WsCloseFrame {
            code: CloseCode::Normal,
            reason: tungstenite::Utf8Bytes::from_static("bye"),
        };
        assert_eq!(upstream_close_error(Some(&frame)), RelayError::UpstreamClosed);
        assert_eq!(upstream_close_error(None), RelayError::UpstreamClosed);
    }

    #[test]
    fn abnormal_upstream_close_is_an_error() {
        let frame = WsCloseFrame {
            code: CloseCode::Error,
            reason: tungstenite::Utf8Bytes::from_static("server_error"),
        };
        let err = upstream_close_error(Some(&frame));
        assert_eq!(
            err,
            RelayError::UpstreamError("closed with code 1011: server_error".to_string())
        );
        assert_eq!(err.close_code(), CLOSE_INTERNAL_ERROR);
    }
}
