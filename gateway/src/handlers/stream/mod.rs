//! Transcription stream handling (WebSocket).

mod handler;
pub mod messages;

pub use handler::stream_handler;
