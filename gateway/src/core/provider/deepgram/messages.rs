//! Deepgram listen v1 streaming API message types.

use serde::{Deserialize, Serialize};

/// Parsed incoming message from the Deepgram WebSocket.
#[derive(Debug)]
pub enum DeepgramMessage {
    /// Transcription results for a stretch of audio
    Results(ResultsMessage),
    /// Stream metadata, sent on connect and on close
    Metadata,
    /// VAD detected the start of speech
    SpeechStarted,
    /// VAD detected the end of an utterance
    UtteranceEnd,
    /// Unrecognized message type, kept raw for logging
    Unknown(String),
}

impl DeepgramMessage {
    /// Parse a text frame into a typed message.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        match value.get("type").and_then(|t| t.as_str()) {
            Some("Results") => Ok(Self::Results(serde_json::from_value(value)?)),
            Some("Metadata") => Ok(Self::Metadata),
            Some("SpeechStarted") => Ok(Self::SpeechStarted),
            Some("UtteranceEnd") => Ok(Self::UtteranceEnd),
            _ => Ok(Self::Unknown(text.to_string())),
        }
    }
}

/// A `Results` message carrying one channel of alternatives.
#[derive(Debug, Deserialize)]
pub struct ResultsMessage {
    pub channel: ResultsChannel,
    #[serde(default)]
    pub is_final: bool,
}

impl ResultsMessage {
    /// The top alternative, if the server sent any.
    pub fn top_alternative(&self) -> Option<&Alternative> {
        self.channel.alternatives.first()
    }
}

/// Channel payload inside a `Results` message.
#[derive(Debug, Deserialize)]
pub struct ResultsChannel {
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

/// One transcription alternative.
#[derive(Debug, Deserialize)]
pub struct Alternative {
    pub transcript: String,
    #[serde(default)]
    pub confidence: f32,
}

/// Client control message keeping an idle stream open.
#[derive(Debug, Serialize)]
pub struct KeepAliveMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
}

impl Default for KeepAliveMessage {
    fn default() -> Self {
        Self {
            message_type: "KeepAlive",
        }
    }
}

/// Client control message requesting stream finalization and close.
#[derive(Debug, Serialize)]
pub struct CloseStreamMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
}

impl Default for CloseStreamMessage {
    fn default() -> Self {
        Self {
            message_type: "CloseStream",
        }
    }
}
