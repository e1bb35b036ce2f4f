//! Streaming speech-to-text providers.
//!
//! Each submodule adapts one upstream vendor's streaming API to the
//! [`Provider`]/[`Session`] contract. The gateway core never talks to a
//! vendor directly; everything goes through these traits.

pub mod assemblyai;
mod base;
pub mod deepgram;

pub use assemblyai::AssemblyAiProvider;
pub use base::{
    Provider, Session, SessionConfig, SessionError, SessionResult, TranscriptionResult,
};
pub use deepgram::DeepgramProvider;

use std::sync::Arc;

use crate::config::ServerConfig;

/// Supported STT providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Deepgram listen v1 WebSocket API
    Deepgram,
    /// AssemblyAI Streaming v3 WebSocket API
    AssemblyAi,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Deepgram => write!(f, "deepgram"),
            ProviderKind::AssemblyAi => write!(f, "assemblyai"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deepgram" => Ok(ProviderKind::Deepgram),
            "assemblyai" | "assembly-ai" => Ok(ProviderKind::AssemblyAi),
            _ => Err(SessionError::ConfigurationError(format!(
                "Unsupported STT provider: {s}. Supported providers: deepgram, assemblyai"
            ))),
        }
    }
}

/// Create a provider by kind, pulling its credentials from the server config.
///
/// A missing or empty credential fails this provider only; the caller decides
/// whether the process can continue with the providers that remain.
pub fn create_provider(
    kind: ProviderKind,
    config: &ServerConfig,
) -> SessionResult<Arc<dyn Provider>> {
    match kind {
        ProviderKind::Deepgram => {
            let api_key = config.deepgram_api_key.clone().ok_or_else(|| {
                SessionError::AuthenticationFailed(
                    "DEEPGRAM_API_KEY is not set in the environment".to_string(),
                )
            })?;
            Ok(Arc::new(DeepgramProvider::new(api_key)?))
        }
        ProviderKind::AssemblyAi => {
            let api_key = config.assemblyai_api_key.clone().ok_or_else(|| {
                SessionError::AuthenticationFailed(
                    "ASSEMBLYAI_API_KEY is not set in the environment".to_string(),
                )
            })?;
            Ok(Arc::new(AssemblyAiProvider::new(api_key)?))
        }
    }
}

#[cfg(test)]
mod factory_tests {
    use super::*;

    #[test]
    fn test_provider_kind_from_string() {
        assert_eq!(
            "deepgram".parse::<ProviderKind>().unwrap(),
            ProviderKind::Deepgram
        );
        assert_eq!(
            "Deepgram".parse::<ProviderKind>().unwrap(),
            ProviderKind::Deepgram
        );
        assert_eq!(
            "assemblyai".parse::<ProviderKind>().unwrap(),
            ProviderKind::AssemblyAi
        );
        assert_eq!(
            "ASSEMBLYAI".parse::<ProviderKind>().unwrap(),
            ProviderKind::AssemblyAi
        );

        let result = "invalid".parse::<ProviderKind>();
        assert!(result.is_err());
        if let Err(SessionError::ConfigurationError(msg)) = result {
            assert!(msg.contains("Unsupported STT provider: invalid"));
        }
    }

    #[test]
    fn test_provider_kind_display() {
        assert_eq!(ProviderKind::Deepgram.to_string(), "deepgram");
        assert_eq!(ProviderKind::AssemblyAi.to_string(), "assemblyai");
    }

    #[test]
    fn test_create_provider_without_credentials() {
        let config = ServerConfig::default();

        let result = create_provider(ProviderKind::Deepgram, &config);
        assert!(matches!(
            result,
            Err(SessionError::AuthenticationFailed(_))
        ));

        let result = create_provider(ProviderKind::AssemblyAi, &config);
        assert!(matches!(
            result,
            Err(SessionError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_create_provider_with_credentials() {
        let config = ServerConfig {
            deepgram_api_key: Some("dg_test_key".to_string()),
            assemblyai_api_key: Some("aai_test_key".to_string()),
            ..Default::default()
        };

        let provider = create_provider(ProviderKind::Deepgram, &config).unwrap();
        assert_eq!(provider.name(), "deepgram");

        let provider = create_provider(ProviderKind::AssemblyAi, &config).unwrap();
        assert_eq!(provider.name(), "assemblyai");
    }
}
