//! Deepgram streaming speech-to-text provider.
//!
//! Adapter over the Deepgram listen v1 WebSocket. Transcription options ride
//! on the query string; audio is sent as raw binary frames; results arrive
//! as JSON `Results` messages with an `is_final` flag.
//!
//! Deepgram finalizes a stream that goes quiet, so the socket task sends a
//! periodic `KeepAlive` control frame while the session is open.

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
use messages::{CloseStreamMessage, DeepgramMessage, KeepAliveMessage};

const PROVIDER_NAME: &str = "deepgram";

const DEEPGRAM_HOST: &str = "api.deepgram.com";

/// Transcription model requested from Deepgram.
const MODEL: &str = "nova-3";

/// Silence duration after which Deepgram emits an UtteranceEnd event.
const UTTERANCE_END_MS: u32 = 1000;

/// Cadence of KeepAlive control frames.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

const RESULT_QUEUE_CAPACITY: usize = 100;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Deepgram provider factory.
pub struct DeepgramProvider {
    api_key: String,
}

impl DeepgramProvider {
    /// Create a provider with the given API key.
    pub fn new(api_key: String) -> SessionResult<Self> {
        if api_key.is_empty() {
            return Err(SessionError::AuthenticationFailed(
                "API key is required for Deepgram".to_string(),
            ));
        }
        Ok(Self { api_key })
    }

    fn websocket_url(config: &SessionConfig) -> String {
        format!(
            "wss://{}/v1/listen?model={}&language={}&punctuate=true&encoding=linear16\
             &channels=1&sample_rate={}&interim_results={}&vad_events=true&utterance_end_ms={}",
            DEEPGRAM_HOST,
            MODEL,
            config.language,
            config.sample_rate,
            config.interim_results,
            UTTERANCE_END_MS,
        )
    }
}

#[async_trait]
impl Provider for DeepgramProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn new_session(&self, config: &SessionConfig) -> SessionResult<Arc<dyn Session>> {
        let url = Self::websocket_url(config);

        let request = tokio_tungstenite::tungstenite::http::Request::builder()
            .method("GET")
            .uri(&url)
            .header("Host", DEEPGRAM_HOST)
            .header("Upgrade", "websocket")
            .header("Connection", "upgrade")
            .header("Sec-WebSocket-Key", generate_key())
            .header("Sec-WebSocket-Version", "13")
            .header("Authorization", format!("Token {}", self.api_key))
            .body(())
            .map_err(|e| {
                SessionError::ConnectionFailed(format!("failed to build WebSocket request: {e}"))
            })?;

        let (ws_stream, _response) = connect_async(request).await.map_err(|e| {
            SessionError::ConnectionFailed(format!("failed to connect to Deepgram: {e}"))
        })?;

        info!("connected to Deepgram listen endpoint");

        let (audio_tx, audio_rx) = mpsc::channel::<Bytes>(32);
        let (result_tx, result_rx) = mpsc::channel(RESULT_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_socket(ws_stream, audio_rx, result_tx, shutdown_rx));

        Ok(Arc::new(DeepgramSession {
            audio_tx,
            results: Mutex::new(result_rx),
            shutdown_tx: std::sync::Mutex::new(Some(shutdown_tx)),
            task: Mutex::new(Some(task)),
            closed: AtomicBool::new(false),
        }))
    }
}

/// One live Deepgram transcription stream.
pub struct DeepgramSession {
    audio_tx: mpsc::Sender<Bytes>,
    results: Mutex<mpsc::Receiver<SessionResult<TranscriptionResult>>>,
    shutdown_tx: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    closed: AtomicBool,
}

#[async_trait]
impl Session for DeepgramSession {
    async fn send_audio(&self, frame: Bytes) -> SessionResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SessionError::StreamClosed);
        }

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

        debug!("Deepgram session closed");
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

    let mut keepalive = tokio::time::interval_at(
        tokio::time::Instant::now() + KEEPALIVE_INTERVAL,
        KEEPALIVE_INTERVAL,
    );

    loop {
        tokio::select! {
            frame = audio_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = ws_sink.send(Message::Binary(frame)).await {
                            let err = SessionError::NetworkError(format!(
                                "failed to send audio to Deepgram: {e}"
                            ));
                            error!("{err}");
                            let _ = result_tx.try_send(Err(err));
                            break;
                        }
                    }
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
                        error!("Deepgram stream failed: {err}");
                        let _ = result_tx.try_send(Err(err));
                        break;
                    }
                    None => {
                        info!("Deepgram WebSocket stream ended");
                        break;
                    }
                }
            }

            _ = keepalive.tick() => {
                if let Ok(json) = serde_json::to_string(&KeepAliveMessage::default()) {
                    if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                        warn!("failed to send Deepgram KeepAlive: {e}");
                    }
                }
            }

            _ = &mut shutdown_rx => {
                // CloseStream makes Deepgram flush pending results before
                // closing from its side.
                if let Ok(json) = serde_json::to_string(&CloseStreamMessage::default()) {
                    let _ = ws_sink.send(Message::Text(json.into())).await;
                }
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    debug!("Deepgram socket task exited");
}

/// Handle one incoming WebSocket message. Returns false when the connection
/// should wind down.
async fn handle_message(
    msg: Message,
    result_tx: &mpsc::Sender<SessionResult<TranscriptionResult>>,
) -> bool {
    match msg {
        Message::Text(text) => match DeepgramMessage::parse(&text) {
            Ok(DeepgramMessage::Results(results)) => {
                let Some(alternative) = results.top_alternative() else {
                    return true;
                };

                let transcript = alternative.transcript.trim();
                if transcript.is_empty() {
                    return true;
                }

                let result = TranscriptionResult {
                    text: transcript.to_string(),
                    is_final: results.is_final,
                    confidence: alternative.confidence.clamp(0.0, 1.0),
                    provider_name: PROVIDER_NAME.to_string(),
                    received_at: Instant::now(),
                };

                result_tx.send(Ok(result)).await.is_ok()
            }
            Ok(DeepgramMessage::Metadata) => true,
            Ok(DeepgramMessage::SpeechStarted) | Ok(DeepgramMessage::UtteranceEnd) => true,
            Ok(DeepgramMessage::Unknown(raw)) => {
                debug!("unrecognized Deepgram message: {raw}");
                true
            }
            Err(e) => {
                warn!("failed to parse Deepgram message: {e}");
                true
            }
        },
        Message::Close(frame) => {
            info!("Deepgram WebSocket closed: {frame:?}");
            false
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_requires_api_key() {
        let result = DeepgramProvider::new(String::new());
        assert!(matches!(
            result,
            Err(SessionError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_provider_name() {
        let provider = DeepgramProvider::new("key".to_string()).unwrap();
        assert_eq!(provider.name(), "deepgram");
    }

    #[test]
    fn test_websocket_url() {
        let config = SessionConfig::default();
        let url = DeepgramProvider::websocket_url(&config);

        assert!(url.starts_with("wss://api.deepgram.com/v1/listen?"));
        assert!(url.contains("model=nova-3"));
        assert!(url.contains("language=en-US"));
        assert!(url.contains("encoding=linear16"));
        assert!(url.contains("sample_rate=16000"));
        assert!(url.contains("interim_results=true"));
        assert!(url.contains("utterance_end_ms=1000"));
    }

    #[test]
    fn test_websocket_url_respects_config() {
        let config = SessionConfig {
            sample_rate: 8000,
            language: "fr-FR".to_string(),
            interim_results: false,
            ..Default::default()
        };
        let url = DeepgramProvider::websocket_url(&config);

        assert!(url.contains("sample_rate=8000"));
        assert!(url.contains("language=fr-FR"));
        assert!(url.contains("interim_results=false"));
    }

    #[tokio::test]
    async fn test_handle_final_result() {
        let (tx, mut rx) = mpsc::channel(8);

        let msg = Message::Text(
            r#"{"type":"Results","is_final":true,
                "channel":{"alternatives":[{"transcript":"Hello world","confidence":0.95}]}}"#
                .into(),
        );

        assert!(handle_message(msg, &tx).await);

        let result = rx.try_recv().unwrap().unwrap();
        assert_eq!(result.text, "Hello world");
        assert!(result.is_final);
        assert_eq!(result.provider_name, "deepgram");
        assert!((result.confidence - 0.95).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_handle_interim_result_is_forwarded() {
        // Interim filtering belongs to the selector, not the adapter.
        let (tx, mut rx) = mpsc::channel(8);

        let msg = Message::Text(
            r#"{"type":"Results","is_final":false,
                "channel":{"alternatives":[{"transcript":"Hel","confidence":0.4}]}}"#
                .into(),
        );

        assert!(handle_message(msg, &tx).await);

        let result = rx.try_recv().unwrap().unwrap();
        assert!(!result.is_final);
    }

    #[tokio::test]
    async fn test_handle_empty_transcript_is_skipped() {
        let (tx, mut rx) = mpsc::channel(8);

        let msg = Message::Text(
            r#"{"type":"Results","is_final":true,
                "channel":{"alternatives":[{"transcript":"","confidence":0.0}]}}"#
                .into(),
        );

        assert!(handle_message(msg, &tx).await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handle_close_stops_connection() {
        let (tx, _rx) = mpsc::channel(8);
        assert!(!handle_message(Message::Close(None), &tx).await);
    }
}
