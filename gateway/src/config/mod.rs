//! Server configuration.
//!
//! Configuration comes from the process environment (a `.env` file is loaded
//! by the binaries before this runs). Session parameters are fixed
//! server-side; only the listen address and provider credentials vary per
//! deployment.

use std::time::Duration;

use thiserror::Error;

use crate::core::provider::SessionConfig;

/// Default WebSocket listen port.
pub const DEFAULT_PORT: u16 = 8081;

/// Deadline for draining live connections on shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen host
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Deepgram API key, if the provider is to be enabled
    pub deepgram_api_key: Option<String>,

    /// AssemblyAI API key, if the provider is to be enabled
    pub assemblyai_api_key: Option<String>,

    /// Audio sample rate negotiated with every provider session
    pub sample_rate: u32,

    /// Transcription language
    pub language: String,

    /// Request interim results from providers. Interim results are filtered
    /// before client egress either way; enabling them upstream keeps
    /// provider latency signals fresh.
    pub interim_results: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            deepgram_api_key: None,
            assemblyai_api_key: None,
            sample_rate: 16000,
            language: "en-US".to_string(),
            interim_results: true,
        }
    }
}

impl ServerConfig {
    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = std::env::var("HOST").unwrap_or(defaults.host);

        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "PORT".to_string(),
                message: e.to_string(),
            })?,
            Err(_) => defaults.port,
        };

        Ok(Self {
            host,
            port,
            deepgram_api_key: non_empty_env("DEEPGRAM_API_KEY"),
            assemblyai_api_key: non_empty_env("ASSEMBLYAI_API_KEY"),
            ..defaults
        })
    }

    /// The socket address string to bind.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The session configuration handed to every provider session.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            sample_rate: self.sample_rate,
            language: self.language.clone(),
            interim_results: self.interim_results,
            extensions: Default::default(),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
