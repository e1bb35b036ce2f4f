//! Transcription stream WebSocket handler.
//!
//! One connection owns one [`ProviderSelector`] and two long-lived loops:
//! an inbound loop feeding client audio into the selector and an outbound
//! loop writing forwarded transcriptions back out.
//!
//! Shutdown order is strict: the inbound loop exits first (client close,
//! transport error, or a stop signal from the registry), then the selector
//! is closed, which drains the distributor, closes every provider session,
//! and turns `receive_transcription` into end-of-stream. Only then does the
//! outbound loop finish and the socket get torn down.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::provider::SessionError;
use crate::core::selector::ProviderSelector;
use crate::state::AppState;

use super::messages::{AudioFrameRequest, TranscriptResponse};

/// Maximum WebSocket frame size (1 MB). Audio frames are ~2 KB; anything
/// near this limit is a misbehaving client.
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB).
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Transcription stream WebSocket handler.
///
/// Upgrades the HTTP connection and hands the socket to the stream loop.
pub async fn stream_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_stream_socket(socket, state))
}

/// Drive one client connection to completion.
async fn handle_stream_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    info!(%connection_id, "transcription stream connected");

    let selector = match ProviderSelector::new(
        &state.providers,
        &state.config.session_config(),
    )
    .await
    {
        Ok(selector) => Arc::new(selector),
        Err(err) => {
            // No session could be built; the client sees the connection
            // close. The socket drops here, which closes it.
            error!(%connection_id, error = %err, "failed to create provider selector");
            return;
        }
    };

    let stop_rx = state.connections.register(connection_id);

    let (sender, receiver) = socket.split();

    let outbound = tokio::spawn(outbound_loop(sender, Arc::clone(&selector)));

    inbound_loop(receiver, &selector, stop_rx).await;

    // No further send_audio can happen once the inbound loop has exited, so
    // the selector can be closed and drained.
    if let Err(err) = selector.close().await {
        warn!(%connection_id, error = %err, "error closing provider selector");
    }

    let _ = outbound.await;

    state.connections.deregister(connection_id);
    info!(%connection_id, "transcription stream terminated");
}

/// Read framed audio from the client and feed the selector.
///
/// Parse failures are logged and the frame dropped; the connection
/// continues. End-of-stream, a transport error, or a registry stop signal
/// ends the loop.
async fn inbound_loop(
    mut receiver: SplitStream<WebSocket>,
    selector: &ProviderSelector,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let frame = match AudioFrameRequest::decode(&text) {
                            Ok(frame) => frame,
                            Err(err) => {
                                warn!(error = %err, "dropping malformed audio frame");
                                continue;
                            }
                        };

                        match selector.send_audio(frame).await {
                            Ok(()) => {}
                            Err(SessionError::StreamClosed) => return,
                            Err(err) => {
                                warn!(error = %err, "failed to enqueue audio frame");
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!("dropping unexpected binary frame");
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("client closed transcription stream");
                        return;
                    }
                    // Ping/pong are answered by axum.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "websocket read error");
                        return;
                    }
                }
            }

            _ = stop_rx.changed() => {
                info!("server shutdown, stopping transcription stream");
                return;
            }
        }
    }
}

/// Write forwarded transcriptions to the client.
///
/// Exits cleanly on selector end-of-stream (sending a close frame), or with
/// a logged warning when the transport write fails.
async fn outbound_loop(mut sender: SplitSink<WebSocket, Message>, selector: Arc<ProviderSelector>) {
    loop {
        match selector.receive_transcription().await {
            Ok(Some(result)) => {
                let response = TranscriptResponse {
                    sentence: result.text,
                    confidence: result.confidence,
                };

                let json = match serde_json::to_string(&response) {
                    Ok(json) => json,
                    Err(err) => {
                        error!(error = %err, "failed to serialize transcript response");
                        continue;
                    }
                };

                if let Err(err) = sender.send(Message::Text(json.into())).await {
                    warn!(error = %err, "websocket write error");
                    return;
                }
            }
            Ok(None) => {
                let _ = sender.send(Message::Close(None)).await;
                return;
            }
            Err(err) => {
                warn!(error = %err, "transcription stream error");
                return;
            }
        }
    }
}
