//! Transcription stream route configuration.
//!
//! # Endpoint
//!
//! `GET /ws` - WebSocket upgrade for streaming transcription
//!
//! # Protocol
//!
//! After the upgrade, the client sends JSON text frames:
//!
//! ```json
//! {"buf": "<base64-encoded 16-bit LE mono PCM>"}
//! ```
//!
//! The server responds with one JSON message per finalized transcription:
//!
//! ```json
//! {"sentence": "Hello world", "confidence": 0.95}
//! ```
//!
//! Interim results never reach the client.

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::stream::stream_handler;
use crate::state::AppState;

/// Create the transcription stream router.
pub fn create_stream_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(stream_handler))
        .layer(TraceLayer::new_for_http())
}
