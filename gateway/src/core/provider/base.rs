//! Base traits and types for streaming speech-to-text providers.
//!
//! A [`Provider`] is a factory for [`Session`]s; a session is one live
//! transcription stream against one upstream vendor. Sessions expose a pull
//! interface: audio goes in with [`Session::send_audio`], finalized (and,
//! when enabled, interim) results come out of
//! [`Session::receive_transcription`].
//!
//! # End-of-stream convention
//!
//! Graceful stream end is not a failure. `receive_transcription` returns
//! `Ok(None)` once the session is closed (locally or by the upstream) and
//! all buffered results have been drained. `send_audio` on a closed session
//! returns [`SessionError::StreamClosed`], which callers treat as a quiet
//! stop signal rather than an error worth reporting.
//!
//! # Audio Format
//!
//! All sessions consume PCM 16-bit signed little-endian mono audio at the
//! sample rate carried in [`SessionConfig`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during a transcription session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session has been closed or the upstream ended the stream.
    ///
    /// This is the graceful end-of-stream sentinel for the send path, not a
    /// failure: callers stop sending and move on without logging an error.
    #[error("stream closed")]
    StreamClosed,

    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    /// Network or transport error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Provider-specific error
    #[error("Provider error: {0}")]
    ProviderError(String),
}

impl SessionError {
    /// Whether this error is the graceful end-of-stream sentinel.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, SessionError::StreamClosed)
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

// =============================================================================
// Configuration
// =============================================================================

/// Provider-agnostic configuration for a transcription session.
///
/// Immutable for the lifetime of one client connection. Vendor-specific
/// knobs go in `extensions`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Audio sample rate in Hz (e.g. 16000)
    pub sample_rate: u32,

    /// BCP-47 language code (e.g. "en-US")
    pub language: String,

    /// Whether to request interim (non-final) results from the upstream
    pub interim_results: bool,

    /// Additional provider-specific options
    pub extensions: HashMap<String, serde_json::Value>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            language: "en-US".to_string(),
            interim_results: true,
            extensions: HashMap::new(),
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// A transcription result produced by one provider session.
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    /// The transcribed text
    pub text: String,

    /// Whether the upstream marked this result as final
    pub is_final: bool,

    /// Confidence score in [0.0, 1.0]; 0.0 when the vendor supplies none
    pub confidence: f32,

    /// Stable identifier of the producing provider
    pub provider_name: String,

    /// Monotonic timestamp stamped when the adapter observed the result,
    /// not when the consumer read it
    pub received_at: Instant,
}

// =============================================================================
// Traits
// =============================================================================

/// Factory for transcription sessions against one upstream vendor.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name, constant for the process lifetime.
    fn name(&self) -> &'static str;

    /// Create a new transcription session with the given configuration.
    ///
    /// Connects to the upstream eagerly so configuration and credential
    /// problems surface here rather than on the first audio frame.
    async fn new_session(&self, config: &SessionConfig) -> SessionResult<Arc<dyn Session>>;
}

/// One live streaming transcription session.
///
/// Sessions are created by a [`Provider`], live for the duration of one
/// client connection, and are closed exactly once.
#[async_trait]
pub trait Session: Send + Sync {
    /// Enqueue one audio frame for upstream transmission.
    ///
    /// Returns [`SessionError::StreamClosed`] after [`Session::close`] or
    /// once the upstream has ended the stream.
    async fn send_audio(&self, frame: Bytes) -> SessionResult<()>;

    /// Block until the next transcription result is available.
    ///
    /// Returns `Ok(None)` on graceful end-of-stream. A transient upstream
    /// failure is surfaced as a single `Err`; the session is terminal after
    /// that (no retry happens inside the session).
    async fn receive_transcription(&self) -> SessionResult<Option<TranscriptionResult>>;

    /// Close the session: cancel any in-flight upstream call, unblock
    /// pending `receive_transcription` calls, release vendor resources.
    ///
    /// Idempotent.
    async fn close(&self) -> SessionResult<()>;
}
