//! The session-configuration message the relay injects after `session.created`.
//!
//! This is the only payload the relay originates on the provider connection,
//! so it is the only provider message modelled as a typed structure.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Interviewer prompt used when no instructions file is configured.
pub const DEFAULT_INSTRUCTIONS: &str = "You are a professional technical interviewer \
conducting a mock interview for a freelance role. Ask one question at a time, wait for \
the candidate to finish speaking, and keep follow-ups short and specific. Do not reveal \
model answers unless the candidate asks for feedback at the end.";

pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Sample rate of `pcm16` audio in both directions.
pub const PCM16_SAMPLE_RATE: u32 = 24_000;

/// Invalid values rejected before a configuration is ever sent upstream.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionConfigError {
    #[error("temperature must be between 0.6 and 1.2, got {0}")]
    Temperature(f32),
    #[error("max_response_output_tokens must be between 1 and 4096, got {0}")]
    MaxOutputTokens(u32),
    #[error("VAD threshold must be between 0.0 and 1.0, got {0}")]
    VadThreshold(f32),
    #[error("at least one modality is required")]
    NoModalities,
    #[error("unknown {kind}: {value}")]
    Unknown { kind: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Sage,
    Shimmer,
    Verse,
}

impl FromStr for Voice {
    type Err = SessionConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alloy" => Ok(Self::Alloy),
            "ash" => Ok(Self::Ash),
            "ballad" => Ok(Self::Ballad),
            "coral" => Ok(Self::Coral),
            "echo" => Ok(Self::Echo),
            "sage" => Ok(Self::Sage),
            "shimmer" => Ok(Self::Shimmer),
            "verse" => Ok(Self::Verse),
            _ => Err(SessionConfigError::Unknown {
                kind: "voice",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AudioFormat {
    #[default]
    #[serde(rename = "pcm16")]
    Pcm16,
    #[serde(rename = "g711_ulaw")]
    G711Ulaw,
    #[serde(rename = "g711_alaw")]
    G711Alaw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    #[serde(rename = "server_vad")]
    ServerVad(ServerVadTurnDetection),
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self::ServerVad(ServerVadTurnDetection::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerVadTurnDetection {
    /// Activation threshold for VAD (0.0 to 1.0).
    threshold: f32,

    /// Amount of audio to include before speech starts, in milliseconds.
    prefix_padding_ms: u32,

    /// Duration of silence that ends the speaker's turn, in milliseconds.
    silence_duration_ms: u32,
}

impl Default for ServerVadTurnDetection {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

impl ServerVadTurnDetection {
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_prefix_padding_ms(mut self, prefix_padding_ms: u32) -> Self {
        self.prefix_padding_ms = prefix_padding_ms;
        self
    }

    pub fn with_silence_duration_ms(mut self, silence_duration_ms: u32) -> Self {
        self.silence_duration_ms = silence_duration_ms;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn prefix_padding_ms(&self) -> u32 {
        self.prefix_padding_ms
    }

    pub fn silence_duration_ms(&self) -> u32 {
        self.silence_duration_ms
    }
}

/// Response length cap: a token count, or `"inf"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxOutputTokens {
    Limited(u32),
    #[default]
    Infinite,
}

impl FromStr for MaxOutputTokens {
    type Err = SessionConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("inf") {
            return Ok(Self::Infinite);
        }
        s.parse::<u32>()
            .map(Self::Limited)
            .map_err(|_| SessionConfigError::Unknown {
                kind: "max_response_output_tokens",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for MaxOutputTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(n) => write!(f, "{n}"),
            Self::Infinite => write!(f, "inf"),
        }
    }
}

impl Serialize for MaxOutputTokens {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Limited(n) => serializer.serialize_u32(*n),
            Self::Infinite => serializer.serialize_str("inf"),
        }
    }
}

impl<'de> Deserialize<'de> for MaxOutputTokens {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self::Limited(n)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Interaction parameters for one realtime voice session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub modalities: Vec<Modality>,
    pub instructions: String,
    pub voice: Voice,
    pub input_audio_format: AudioFormat,
    pub output_audio_format: AudioFormat,
    pub input_audio_transcription: InputAudioTranscription,
    pub turn_detection: TurnDetection,
    pub temperature: f32,
    pub max_response_output_tokens: MaxOutputTokens,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            modalities: vec![Modality::Text, Modality::Audio],
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            voice: Voice::default(),
            input_audio_format: AudioFormat::Pcm16,
            output_audio_format: AudioFormat::Pcm16,
            input_audio_transcription: InputAudioTranscription {
                model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            },
            turn_detection: TurnDetection::default(),
            temperature: 0.8,
            max_response_output_tokens: MaxOutputTokens::Infinite,
        }
    }
}

impl SessionConfig {
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.voice = voice;
        self
    }

    pub fn with_transcription_model(mut self, model: impl Into<String>) -> Self {
        self.input_audio_transcription.model = model.into();
        self
    }

    pub fn with_turn_detection(mut self, turn_detection: TurnDetection) -> Self {
        self.turn_detection = turn_detection;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_response_output_tokens(mut self, max: MaxOutputTokens) -> Self {
        self.max_response_output_tokens = max;
        self
    }

    /// Checks the ranges the provider enforces, so a bad value fails at
    /// startup rather than as an upstream `error` frame mid-interview.
    pub fn validate(&self) -> Result<(), SessionConfigError> {
        if self.modalities.is_empty() {
            return Err(SessionConfigError::NoModalities);
        }
        if !(0.6..=1.2).contains(&self.temperature) {
            return Err(SessionConfigError::Temperature(self.temperature));
        }
        if let MaxOutputTokens::Limited(n) = self.max_response_output_tokens
            && !(1..=4096).contains(&n)
        {
            return Err(SessionConfigError::MaxOutputTokens(n));
        }
        let TurnDetection::ServerVad(vad) = &self.turn_detection;
        if !(0.0..=1.0).contains(&vad.threshold()) {
            return Err(SessionConfigError::VadThreshold(vad.threshold()));
        }
        Ok(())
    }
}

/// `session.update` envelope carrying a [`SessionConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "session.update")]
pub struct SessionUpdateEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
    session: SessionConfig,
}

impl SessionUpdateEvent {
    pub fn new(session: SessionConfig) -> Self {
        Self {
            event_id: None,
            session,
        }
    }

    pub fn with_event_id(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn session_update_carries_documented_fields() {
        let event = SessionUpdateEvent::new(SessionConfig::default());
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "session.update");
        assert!(value.get("event_id").is_none());
        let session = &value["session"];
        assert_eq!(session["modalities"], json!(["text", "audio"]));
        assert_eq!(session["voice"], "alloy");
        assert_eq!(session["input_audio_format"], "pcm16");
        assert_eq!(session["output_audio_format"], "pcm16");
        assert_eq!(session["input_audio_transcription"]["model"], "whisper-1");
        assert_eq!(session["turn_detection"]["type"], "server_vad");
        assert_eq!(session["turn_detection"]["threshold"], 0.5);
        assert_eq!(session["turn_detection"]["prefix_padding_ms"], 300);
        assert_eq!(session["turn_detection"]["silence_duration_ms"], 500);
        assert_eq!(session["max_response_output_tokens"], "inf");
        assert!(session["instructions"].as_str().unwrap().contains("interview"));
        assert!((session["temperature"].as_f64().unwrap() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn limited_token_cap_serializes_as_number() {
        let config =
            SessionConfig::default().with_max_response_output_tokens(MaxOutputTokens::Limited(512));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["max_response_output_tokens"], 512);
    }

    #[test]
    fn session_update_parses_back() {
        let original = SessionUpdateEvent::new(
            SessionConfig::default()
                .with_voice(Voice::Verse)
                .with_instructions("Ask about Rust lifetimes."),
        )
        .with_event_id("evt_1");
        let parsed: SessionUpdateEvent = serde_json::from_str(&original.to_json().unwrap()).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.session().voice, Voice::Verse);
    }

    #[test]
    fn voice_and_token_cap_parse_from_strings() {
        assert_eq!("SHIMMER".parse::<Voice>().unwrap(), Voice::Shimmer);
        assert!("robot".parse::<Voice>().is_err());
        assert_eq!("inf".parse::<MaxOutputTokens>().unwrap(), MaxOutputTokens::Infinite);
        assert_eq!(
            "256".parse::<MaxOutputTokens>().unwrap(),
            MaxOutputTokens::Limited(256)
        );
        assert!("lots".parse::<MaxOutputTokens>().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        assert!(SessionConfig::default().validate().is_ok());
        assert_eq!(
            SessionConfig::default().with_temperature(2.0).validate(),
            Err(SessionConfigError::Temperature(2.0))
        );
        assert_eq!(
            SessionConfig::default()
                .with_max_response_output_tokens(MaxOutputTokens::Limited(0))
                .validate(),
            Err(SessionConfigError::MaxOutputTokens(0))
        );
        let vad = ServerVadTurnDetection::default().with_threshold(1.5);
        assert_eq!(
            SessionConfig::default()
                .with_turn_detection(TurnDetection::ServerVad(vad))
                .validate(),
            Err(SessionConfigError::VadThreshold(1.5))
        );
    }
}
