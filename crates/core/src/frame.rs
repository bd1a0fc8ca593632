//! Discriminant-only inspection of provider frames.
//!
//! Frames crossing the relay are opaque JSON envelopes. The relay never
//! deserializes a frame body; it only peeks at the `type` field.

use serde::Deserialize;
use std::borrow::Cow;

pub const SESSION_CREATED: &str = "session.created";
pub const SESSION_UPDATE: &str = "session.update";
pub const SESSION_UPDATED: &str = "session.updated";
pub const INPUT_AUDIO_BUFFER_APPEND: &str = "input_audio_buffer.append";
pub const RESPONSE_AUDIO_DELTA: &str = "response.audio.delta";
pub const RESPONSE_AUDIO_DONE: &str = "response.audio.done";
pub const RESPONSE_AUDIO_TRANSCRIPT_DELTA: &str = "response.audio_transcript.delta";
pub const INPUT_TRANSCRIPTION_COMPLETED: &str =
    "conversation.item.input_audio_transcription.completed";

/// Only the discriminant. Unknown fields are skipped without being allocated.
#[derive(Deserialize)]
struct Envelope<'a> {
    #[serde(rename = "type", borrow)]
    kind: Cow<'a, str>,
}

/// Returns the `type` discriminant of a JSON frame, or `None` when the text is
/// not a JSON object with a string `type` field.
pub fn frame_type(text: &str) -> Option<Cow<'_, str>> {
    serde_json::from_str::<Envelope<'_>>(text)
        .ok()
        .map(|envelope| envelope.kind)
}

/// True when the frame announces that the provider session exists.
pub fn is_session_created(text: &str) -> bool {
    frame_type(text).is_some_and(|kind| kind == SESSION_CREATED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_type_without_touching_payload() {
        let text = r#"{"type":"response.audio.delta","delta":"QUJD","item_id":"it_1"}"#;
        assert_eq!(frame_type(text).as_deref(), Some(RESPONSE_AUDIO_DELTA));
    }

    #[test]
    fn detects_session_created() {
        assert!(is_session_created(
            r#"{"type":"session.created","event_id":"ev_1","session":{"id":"s"}}"#
        ));
        assert!(!is_session_created(r#"{"type":"session.updated"}"#));
    }

    #[test]
    fn malformed_frames_have_no_type() {
        assert_eq!(frame_type("not json"), None);
        assert_eq!(frame_type(r#"{"delta":"QUJD"}"#), None);
        assert_eq!(frame_type(r#"{"type":42}"#), None);
        assert!(!is_session_created(""));
    }

    #[test]
    fn escaped_type_is_still_recognised() {
        assert!(is_session_created(r#"{"type":"session\u002ecreated"}"#));
    }
}
