pub mod config;
pub mod core;
pub mod handlers;
pub mod routes;
pub mod state;

// Re-export commonly used items for convenience
pub use crate::config::ServerConfig;
pub use crate::core::provider::{
    Provider, ProviderKind, Session, SessionConfig, SessionError, TranscriptionResult,
    create_provider,
};
pub use crate::core::selector::{ProviderSelector, SelectorError, SelectorOptions};
pub use crate::state::AppState;
