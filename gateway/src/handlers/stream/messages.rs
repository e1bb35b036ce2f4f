//! Transcription stream wire messages.
//!
//! Both directions carry UTF-8 JSON over the WebSocket. Audio travels
//! client → server as a base64 payload; finalized transcriptions travel
//! server → client as plain text plus confidence.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client → server request carrying one audio frame.
///
/// `buf` is base64-encoded raw linear PCM, 16-bit little-endian, mono, at
/// the session's sample rate. Frames should stay at or under 2048 bytes
/// (one 1024-sample buffer) to bound latency.
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameRequest {
    pub buf: String,
}

impl AudioFrameRequest {
    /// Encode raw PCM bytes into a request.
    pub fn from_pcm(frame: &[u8]) -> Self {
        Self {
            buf: BASE64.encode(frame),
        }
    }

    /// Parse a text frame and decode its audio payload.
    pub fn decode(text: &str) -> Result<Bytes, FrameParseError> {
        let request: AudioFrameRequest = serde_json::from_str(text)?;
        let pcm = BASE64.decode(request.buf.as_bytes())?;
        Ok(Bytes::from(pcm))
    }
}

/// Server → client response carrying one finalized transcription.
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptResponse {
    pub sentence: String,
    pub confidence: f32,
}

/// A client frame that could not be parsed. Logged and dropped; never fatal
/// to the connection.
#[derive(Debug, Error)]
pub enum FrameParseError {
    #[error("invalid frame JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_round_trip() {
        let pcm = b"hello world audio";
        let request = AudioFrameRequest::from_pcm(pcm);
        let json = serde_json::to_string(&request).unwrap();

        let decoded = AudioFrameRequest::decode(&json).unwrap();
        assert_eq!(&decoded[..], pcm);
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        let err = AudioFrameRequest::decode("invalid json").unwrap_err();
        assert!(matches!(err, FrameParseError::Json(_)));
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        let err = AudioFrameRequest::decode(r#"{"buf":"!!not-base64!!"}"#).unwrap_err();
        assert!(matches!(err, FrameParseError::Base64(_)));
    }

    #[test]
    fn test_decode_rejects_missing_field() {
        let err = AudioFrameRequest::decode(r#"{"audio":"aGk="}"#).unwrap_err();
        assert!(matches!(err, FrameParseError::Json(_)));
    }

    #[test]
    fn test_transcript_response_serialization() {
        let response = TranscriptResponse {
            sentence: "Hello world".to_string(),
            confidence: 0.95,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"sentence":"Hello world","confidence":0.95}"#);
    }
}
