use interview_core::session_config::{
    MaxOutputTokens, ServerVadTurnDetection, SessionConfig, TurnDetection, Voice,
};
use secrecy::SecretString;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Provider credential. Absence is reported per session, not at startup.
    pub openai_api_key: Option<SecretString>,
    pub realtime_url: String,
    pub realtime_model: String,
    /// The `session.update` payload injected into every session.
    pub session: SessionConfig,
    pub instructions_path: Option<PathBuf>,
    pub connect_timeout: Duration,
    /// Bound on a single forwarded send; a peer that stops reading ends the session.
    pub forward_timeout: Duration,
    pub close_timeout: Duration,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address = parse_var("BIND_ADDRESS", "0.0.0.0:3000".parse::<SocketAddr>())?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);

        let realtime_url =
            std::env::var("REALTIME_URL").unwrap_or_else(|_| DEFAULT_REALTIME_URL.to_string());
        if !(realtime_url.starts_with("ws://") || realtime_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue(
                "REALTIME_URL".to_string(),
                format!("'{}' is not a ws:// or wss:// URL", realtime_url),
            ));
        }
        let realtime_model =
            std::env::var("REALTIME_MODEL").unwrap_or_else(|_| DEFAULT_REALTIME_MODEL.to_string());

        let defaults = SessionConfig::default();
        let TurnDetection::ServerVad(default_vad) = defaults.turn_detection.clone();
        let vad = ServerVadTurnDetection::default()
            .with_threshold(parse_var("VAD_THRESHOLD", Ok::<_, String>(default_vad.threshold()))?)
            .with_prefix_padding_ms(parse_var(
                "VAD_PREFIX_PADDING_MS",
                Ok::<_, String>(default_vad.prefix_padding_ms()),
            )?)
            .with_silence_duration_ms(parse_var(
                "VAD_SILENCE_DURATION_MS",
                Ok::<_, String>(default_vad.silence_duration_ms()),
            )?);

        let mut session = defaults
            .clone()
            .with_voice(parse_var("REALTIME_VOICE", Ok::<_, String>(Voice::Alloy))?)
            .with_temperature(parse_var(
                "TEMPERATURE",
                Ok::<_, String>(defaults.temperature),
            )?)
            .with_max_response_output_tokens(parse_var(
                "MAX_RESPONSE_OUTPUT_TOKENS",
                Ok::<_, String>(MaxOutputTokens::Infinite),
            )?)
            .with_turn_detection(TurnDetection::ServerVad(vad));
        if let Ok(model) = std::env::var("TRANSCRIPTION_MODEL") {
            session = session.with_transcription_model(model);
        }
        session
            .validate()
            .map_err(|e| ConfigError::InvalidValue("session".to_string(), e.to_string()))?;

        let instructions_path = std::env::var("INSTRUCTIONS_PATH").ok().map(PathBuf::from);

        let connect_timeout = Duration::from_secs(parse_var(
            "UPSTREAM_CONNECT_TIMEOUT_SECS",
            Ok::<_, String>(10u64),
        )?);
        let forward_timeout =
            Duration::from_millis(parse_var("FORWARD_TIMEOUT_MS", Ok::<_, String>(5000u64))?);
        let close_timeout =
            Duration::from_millis(parse_var("CLOSE_TIMEOUT_MS", Ok::<_, String>(1000u64))?);
        if connect_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "UPSTREAM_CONNECT_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if forward_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "FORWARD_TIMEOUT_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openai_api_key,
            realtime_url,
            realtime_model,
            session,
            instructions_path,
            connect_timeout,
            forward_timeout,
            close_timeout,
            log_level,
        })
    }
}

/// Reads `name` and parses it, falling back to `default` when it is unset.
fn parse_var<T, E>(name: &str, default: Result<T, E>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    E: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => default.map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
    }
}
