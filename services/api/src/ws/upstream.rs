//! Opens the provider side of a relay session.

use crate::config::Config;
use interview_core::RelayError;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        client::IntoClientRequest,
        handshake::client::Request,
        http::{HeaderName, HeaderValue, header::AUTHORIZATION},
    },
};
use tracing::{debug, info, warn};
use url::form_urlencoded;

/// Protocol-version header the provider requires on realtime connections.
pub const OPENAI_BETA_HEADER: HeaderName = HeaderName::from_static("openai-beta");
pub const OPENAI_BETA_VALUE: &str = "realtime=v1";

pub type UpstreamStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Builds the handshake request for `<url>?model=<model>` with the bearer
/// credential and the protocol-version header attached.
pub fn build_request(url: &str, model: &str, api_key: &SecretString) -> anyhow::Result<Request> {
    let separator = if url.contains('?') { '&' } else { '?' };
    let model: String = form_urlencoded::byte_serialize(model.as_bytes()).collect();
    let mut request = format!("{url}{separator}model={model}").into_client_request()?;

    let mut bearer = HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))?;
    bearer.set_sensitive(true);
    let headers = request.headers_mut();
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(OPENAI_BETA_HEADER, HeaderValue::from_static(OPENAI_BETA_VALUE));
    Ok(request)
}

/// Connects to the provider, bounded by the configured handshake timeout.
///
/// Every failure, including a timeout, is reported as
/// [`RelayError::UpstreamUnreachable`]; there is no retry.
pub async fn connect(config: &Config, api_key: &SecretString) -> Result<UpstreamStream, RelayError> {
    let request = build_request(&config.realtime_url, &config.realtime_model, api_key)
        .map_err(|e| RelayError::UpstreamUnreachable(format!("invalid upstream request: {e}")))?;
    debug!(uri = %request.uri(), "Connecting to realtime provider");

    connect_with_timeout(request, config.connect_timeout).await
}

async fn connect_with_timeout(
    request: Request,
    timeout: Duration,
) -> Result<UpstreamStream, RelayError> {
    match tokio::time::timeout(timeout, connect_async(request)).await {
        Ok(Ok((stream, response))) => {
            info!(status = %response.status(), "Connected to realtime provider");
            Ok(stream)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Realtime provider handshake failed");
            Err(RelayError::UpstreamUnreachable(e.to_string()))
        }
        Err(_) => {
            warn!(?timeout, "Realtime provider handshake timed out");
            Err(RelayError::UpstreamUnreachable(format!(
                "handshake timed out after {}ms",
                timeout.as_millis()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn request_carries_bearer_and_protocol_header() {
        let key = SecretString::from("sk-test".to_string());
        let request =
            build_request("wss://api.openai.com/v1/realtime", "gpt-4o-realtime-preview", &key)
                .unwrap();

        assert_eq!(
            request.uri().to_string(),
            "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview"
        );
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer sk-test");
        assert!(request.headers()[AUTHORIZATION].is_sensitive());
        assert_eq!(request.headers()["OpenAI-Beta"], "realtime=v1");
    }

    #[test]
    fn existing_query_is_extended() {
        let key = SecretString::from("sk-test".to_string());
        let request = build_request("ws://localhost:9000/realtime?debug=1", "m", &key).unwrap();
        assert_eq!(request.uri().query(), Some("debug=1&model=m"));
    }

    #[test]
    fn model_is_percent_encoded_into_the_query() {
        let key = SecretString::from("sk-test".to_string());
        let request =
            build_request("ws://localhost:9000/realtime", "gpt 4o&debug=1#x", &key).unwrap();
        assert_eq!(request.uri().query(), Some("model=gpt+4o%26debug%3D1%23x"));
        assert_eq!(request.uri().path(), "/realtime");
    }

    #[test]
    fn credential_with_control_characters_is_rejected() {
        let key = SecretString::from("sk-\nbad".to_string());
        assert!(build_request("ws://localhost:9000/realtime", "m", &key).is_err());
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let key = SecretString::from("sk-test".to_string());
        let request = build_request(&format!("ws://{addr}/realtime"), "m", &key).unwrap();
        let err = connect_with_timeout(request, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::UpstreamUnreachable(_)));
    }

    #[tokio::test]
    async fn silent_handshake_times_out() {
        // Accepts TCP but never answers the HTTP upgrade.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let key = SecretString::from("sk-test".to_string());
        let request = build_request(&format!("ws://{addr}/realtime"), "m", &key).unwrap();
        let err = connect_with_timeout(request, Duration::from_millis(200))
            .await
            .unwrap_err();
        match err {
            RelayError::UpstreamUnreachable(msg) => assert!(msg.contains("timed out")),
            other => panic!("Expected UpstreamUnreachable, got {other:?}"),
        }
    }
}
