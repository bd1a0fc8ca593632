//! Wire-format helpers for the browser side of an interview.
//!
//! The relay never looks inside audio frames. These helpers exist for the
//! peers that do: the `probe` client and the integration tests, which play the
//! role of the browser's capture and playback pipeline.

use base64::Engine;
use interview_core::frame::{INPUT_AUDIO_BUFFER_APPEND, RESPONSE_AUDIO_DELTA};
use interview_core::session_config::PCM16_SAMPLE_RATE;
use serde_json::{Value, json};
use std::time::Duration;

/// Encodes mono PCM16 samples as little-endian bytes in standard base64.
pub fn encode_pcm16(samples: &[i16]) -> String {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decodes base64 little-endian PCM16. A trailing odd byte is ignored.
pub fn decode_pcm16(fragment: &str) -> Result<Vec<i16>, base64::DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(fragment)?;
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Converts normalized float samples to PCM16, clamping to the valid range.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Builds an `input_audio_buffer.append` frame carrying `samples`.
pub fn append_frame(samples: &[i16]) -> String {
    json!({
        "type": INPUT_AUDIO_BUFFER_APPEND,
        "audio": encode_pcm16(samples),
    })
    .to_string()
}

/// Extracts the samples of a `response.audio.delta` frame.
///
/// Returns `None` for any other frame, or when the delta is not valid base64.
pub fn audio_delta_samples(frame: &str) -> Option<Vec<i16>> {
    let value: Value = serde_json::from_str(frame).ok()?;
    if value.get("type")?.as_str()? != RESPONSE_AUDIO_DELTA {
        return None;
    }
    decode_pcm16(value.get("delta")?.as_str()?).ok()
}

/// A sine tone at the realtime sample rate, useful as stand-in microphone input.
pub fn tone(frequency_hz: f32, duration: Duration, amplitude: f32) -> Vec<i16> {
    let count = (duration.as_secs_f64() * PCM16_SAMPLE_RATE as f64).round() as usize;
    let step = 2.0 * std::f32::consts::PI * frequency_hz / PCM16_SAMPLE_RATE as f32;
    let floats: Vec<f32> = (0..count)
        .map(|i| amplitude * (step * i as f32).sin())
        .collect();
    f32_to_pcm16(&floats)
}

/// Playback length of `sample_count` mono samples at the realtime sample rate.
pub fn playback_duration(sample_count: usize) -> Duration {
    Duration::from_secs_f64(sample_count as f64 / PCM16_SAMPLE_RATE as f64)
}
