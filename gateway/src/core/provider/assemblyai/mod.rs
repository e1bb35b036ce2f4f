//! AssemblyAI streaming speech-to-text provider.
//!
//! Adapter over the AssemblyAI Streaming API v3 WebSocket. Audio is sent as
//! raw binary frames; results arrive as JSON `Turn` messages with an
//! `end_of_turn` flag marking finalized transcripts.
//!
//! The upstream pushes results asynchronously, so the adapter interposes a
//! bounded queue between the socket task and [`Session::receive_transcription`]:
//! the socket task parses and stamps each result, the consumer pulls at its
//! own pace, and nothing is ever delivered to a closed sink.

mod messages;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use super::base::{Provider, Session, SessionConfig, SessionError, SessionResult, TranscriptionResult};
use messages::{AssemblyAiMessage, TerminateMessage};

const PROVIDER_NAME: &str = "assemblyai";

/// Streaming v3 endpoint host.
const ASSEMBLYAI_HOST: &str = "streaming.assemblyai.com";

/// Bounded result queue between the socket task and the consumer.
const RESULT_QUEUE_CAPACITY: usize = 100;

/// How long `close` waits for the socket task to wind down.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// AssemblyAI provider factory.
pub struct AssemblyAiProvider {
    api_key: String,
}

impl AssemblyAiProvider {
    /// Create a provider with the given API key.
    pub fn new(api_key: String) -> SessionResult<Self> {
        if api_key.is_empty() {
            return Err(SessionError::AuthenticationFailed(
                "API key is required for AssemblyAI".to_string(),
            ));
        }
        Ok(Self { api_key })
    }

    fn websocket_url(config: &SessionConfig) -> String {
        format!(
            "wss://{}/v3/ws?sample_rate={}&encoding=pcm_s16le&format_turns=true",
            ASSEMBLYAI_HOST, config.sample_rate
        )
    }
}

#[async_trait]
impl Provider for AssemblyAiProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn new_session(&self, config: &SessionConfig) -> SessionResult<Arc<dyn Session>> {
        let url = Self::websocket_url(config);

        // AssemblyAI authenticates WebSocket upgrades with the raw API key,
        // no Bearer prefix.
        let request = tokio_tungstenite::tungstenite::http::Request::builder()
            .method("GET")
            .uri(&url)
            .header("Host", ASSEMBLYAI_HOST)
            .header("Upgrade", "websocket")
            .header("Connection", "upgrade")
            .header("Sec-WebSocket-Key", generate_key())
            .header("Sec-WebSocket-Version", "13")
            .header("Authorization", &self.api_key)
            .body(())
            .map_err(|e| {
                SessionError::ConnectionFailed(format!("failed to build WebSocket request: {e}"))
            })?;

        let (ws_stream, _response) = connect_async(request).await.map_err(|e| {
            SessionError::ConnectionFailed(format!("failed to connect to AssemblyAI: {e}"))
        })?;

        info!("connected to AssemblyAI streaming endpoint");

        let (audio_tx, audio_rx) = mpsc::channel::<Bytes>(32);
        let (result_tx, result_rx) = mpsc::channel(RESULT_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_socket(ws_stream, audio_rx, result_tx, shutdown_rx));

        Ok(Arc::new(AssemblyAiSession {
            audio_tx,
            results: Mutex::new(result_rx),
            shutdown_tx: std::sync::Mutex::new(Some(shutdown_tx)),
            task: Mutex::new(Some(task)),
            closed: AtomicBool::new(false),
        }))
    }
}

/// One live AssemblyAI transcription stream.
pub struct AssemblyAiSession {
    audio_tx: mpsc::Sender<Bytes>,
    results: Mutex<mpsc::Receiver<SessionResult<TranscriptionResult>>>,
    shutdown_tx: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    closed: AtomicBool,
}

#[async_trait]
impl Session for AssemblyAiSession {
    async fn send_audio(&self, frame: Bytes) -> SessionResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SessionError::StreamClosed);
        }

        // A dropped receiver means the socket task has exited, which is the
        // upstream's end-of-stream as far as the caller is concerned.
        self.audio_tx
            .send(frame)
            .await
            .map_err(|_| SessionError::StreamClosed)
    }

    async fn receive_transcription(&self) -> SessionResult<Option<TranscriptionResult>> {
        let mut results = self.results.lock().await;
        match results.recv().await {
            Some(Ok(result)) => Ok(Some(result)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }

    async fn close(&self) -> SessionResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(shutdown_tx) = self.shutdown_tx.lock().expect("shutdown lock").take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(task) = self.task.lock().await.take() {
            let _ = timeout(CLOSE_TIMEOUT, task).await;
        }

        debug!("AssemblyAI session closed");
        Ok(())
    }
}

/// Socket task: owns the upstream WebSocket for the session's lifetime.
async fn run_socket(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    mut audio_rx: mpsc::Receiver<Bytes>,
    result_tx: mpsc::Sender<SessionResult<TranscriptionResult>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let (mut ws_sink, mut ws_source) = ws_stream.split();

    loop {
        tokio::select! {
            frame = audio_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = ws_sink.send(Message::Binary(frame)).await {
                            let err = SessionError::NetworkError(format!(
                                "failed to send audio to AssemblyAI: {e}"
                            ));
                            error!("{err}");
                            let _ = result_tx.try_send(Err(err));
                            break;
                        }
                    }
                    // Session dropped without close; wind down quietly.
                    None => break,
                }
            }

            message = ws_source.next() => {
                match message {
                    Some(Ok(msg)) => {
                        if !handle_message(msg, &result_tx).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        let err = SessionError::NetworkError(format!("WebSocket error: {e}"));
                        error!("AssemblyAI stream failed: {err}");
                        let _ = result_tx.try_send(Err(err));
                        break;
                    }
                    None => {
                        info!("AssemblyAI WebSocket stream ended");
                        break;
                    }
                }
            }

            _ = &mut shutdown_rx => {
                // Graceful shutdown: ask the server to finalize, then close.
                if let Ok(json) = serde_json::to_string(&TerminateMessage::default()) {
                    let _ = ws_sink.send(Message::Text(json.into())).await;
                }
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    debug!("AssemblyAI socket task exited");
}

/// Handle one incoming WebSocket message. Returns false when the connection
/// should wind down.
async fn handle_message(
    msg: Message,
    result_tx: &mpsc::Sender<SessionResult<TranscriptionResult>>,
) -> bool {
    match msg {
        Message::Text(text) => match AssemblyAiMessage::parse(&text) {
            Ok(AssemblyAiMessage::Begin(begin)) => {
                info!(
                    session_id = %begin.id,
                    expires_at = begin.expires_at,
                    "AssemblyAI session started"
                );
                true
            }
            Ok(AssemblyAiMessage::Turn(turn)) => {
                let transcript = turn.transcript.trim();
                if transcript.is_empty() {
                    return true;
                }

                let result = TranscriptionResult {
                    text: transcript.to_string(),
                    is_final: turn.end_of_turn,
                    confidence: turn.confidence(),
                    provider_name: PROVIDER_NAME.to_string(),
                    received_at: Instant::now(),
                };

                // Consumer gone means the session is being torn down.
                result_tx.send(Ok(result)).await.is_ok()
            }
            Ok(AssemblyAiMessage::Termination(term)) => {
                info!(
                    audio_seconds = term.audio_duration_seconds,
                    session_seconds = term.session_duration_seconds,
                    "AssemblyAI session terminated"
                );
                false
            }
            Ok(AssemblyAiMessage::Error(err)) => {
                let err = SessionError::ProviderError(err.error);
                error!("AssemblyAI error: {err}");
                let _ = result_tx.try_send(Err(err));
                false
            }
            Ok(AssemblyAiMessage::Unknown(raw)) => {
                debug!("unrecognized AssemblyAI message: {raw}");
                true
            }
            Err(e) => {
                warn!("failed to parse AssemblyAI message: {e}");
                true
            }
        },
        Message::Close(frame) => {
            info!("AssemblyAI WebSocket closed: {frame:?}");
            false
        }
        _ => true,
    }
}
