pub mod provider;
pub mod selector;

// Re-export commonly used types for convenience
pub use provider::{
    Provider, ProviderKind, Session, SessionConfig, SessionError, SessionResult,
    TranscriptionResult, create_provider,
};
pub use selector::{ProviderSelector, SelectorError, SelectorOptions};
