//! AssemblyAI Streaming API v3 message types.
//!
//! The v3 protocol is JSON over WebSocket with a `type` discriminator.
//! Audio flows the other way as raw binary frames.

use serde::{Deserialize, Serialize};

/// Parsed incoming message from the AssemblyAI WebSocket.
#[derive(Debug)]
pub enum AssemblyAiMessage {
    /// Session established
    Begin(BeginMessage),
    /// A (partial or completed) turn of speech
    Turn(TurnMessage),
    /// Session terminated by the server
    Termination(TerminationMessage),
    /// Server-side error
    Error(ErrorMessage),
    /// Unrecognized message type, kept raw for logging
    Unknown(String),
}

impl AssemblyAiMessage {
    /// Parse a text frame into a typed message.
    ///
    /// Unknown `type` values parse as [`AssemblyAiMessage::Unknown`] so new
    /// server-side message types never break the stream.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        match value.get("type").and_then(|t| t.as_str()) {
            Some("Begin") => Ok(Self::Begin(serde_json::from_value(value)?)),
            Some("Turn") => Ok(Self::Turn(serde_json::from_value(value)?)),
            Some("Termination") => Ok(Self::Termination(serde_json::from_value(value)?)),
            Some("Error") => Ok(Self::Error(serde_json::from_value(value)?)),
            _ => Ok(Self::Unknown(text.to_string())),
        }
    }
}

/// Session start notification.
#[derive(Debug, Deserialize)]
pub struct BeginMessage {
    /// Server-assigned session id
    pub id: String,
    /// Unix timestamp at which the session expires
    #[serde(default)]
    pub expires_at: f64,
}

/// One turn of speech. `end_of_turn` marks the transcript as finalized.
#[derive(Debug, Deserialize)]
pub struct TurnMessage {
    pub transcript: String,
    pub end_of_turn: bool,
    /// Word-level results; confidence is averaged over these
    #[serde(default)]
    pub words: Vec<TurnWord>,
}

impl TurnMessage {
    /// Average word confidence, or 0.0 when the server sent no words.
    pub fn confidence(&self) -> f32 {
        if self.words.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.words.iter().map(|w| w.confidence).sum();
        ((sum / self.words.len() as f64) as f32).clamp(0.0, 1.0)
    }
}

/// Word-level timing and confidence inside a turn.
#[derive(Debug, Deserialize)]
pub struct TurnWord {
    pub text: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Session end notification.
#[derive(Debug, Deserialize)]
pub struct TerminationMessage {
    #[serde(default)]
    pub audio_duration_seconds: f64,
    #[serde(default)]
    pub session_duration_seconds: f64,
}

/// Server-side error payload.
#[derive(Debug, Deserialize)]
pub struct ErrorMessage {
    pub error: String,
}

/// Client control message requesting graceful session termination.
#[derive(Debug, Serialize)]
pub struct TerminateMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
}

impl Default for TerminateMessage {
    fn default() -> Self {
        Self {
            message_type: "Terminate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_begin() {
        let msg = AssemblyAiMessage::parse(
            r#"{"type":"Begin","id":"session-123","expires_at":1704067200}"#,
        )
        .unwrap();

        match msg {
            AssemblyAiMessage::Begin(begin) => assert_eq!(begin.id, "session-123"),
            other => panic!("expected Begin, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_turn_with_words() {
        let msg = AssemblyAiMessage::parse(
            r#"{"type":"Turn","transcript":"hello world","end_of_turn":true,
                "words":[{"text":"hello","confidence":0.9},{"text":"world","confidence":0.8}]}"#,
        )
        .unwrap();

        match msg {
            AssemblyAiMessage::Turn(turn) => {
                assert_eq!(turn.transcript, "hello world");
                assert!(turn.end_of_turn);
                assert_eq!(turn.words[0].text, "hello");
                assert!((turn.confidence() - 0.85).abs() < 1e-6);
            }
            other => panic!("expected Turn, got {other:?}"),
        }
    }

    #[test]
    fn test_turn_without_words_has_zero_confidence() {
        let msg = AssemblyAiMessage::parse(
            r#"{"type":"Turn","transcript":"hi","end_of_turn":false}"#,
        )
        .unwrap();

        match msg {
            AssemblyAiMessage::Turn(turn) => assert_eq!(turn.confidence(), 0.0),
            other => panic!("expected Turn, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_type() {
        let msg = AssemblyAiMessage::parse(r#"{"type":"SomethingNew","data":42}"#).unwrap();
        assert!(matches!(msg, AssemblyAiMessage::Unknown(_)));
    }

    #[test]
    fn test_parse_invalid_json_fails() {
        assert!(AssemblyAiMessage::parse("not json").is_err());
    }

    #[test]
    fn test_terminate_serialization() {
        let json = serde_json::to_string(&TerminateMessage::default()).unwrap();
        assert_eq!(json, r#"{"type":"Terminate"}"#);
    }
}
