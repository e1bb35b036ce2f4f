//! Multi-provider selector.
//!
//! [`ProviderSelector`] fans one client's audio out to every configured
//! provider concurrently, collects their finalized results, and forwards the
//! stream of whichever provider is currently the most responsive. It exposes
//! the same [`Session`] contract a single provider would, so callers never
//! see the multiplexing.
//!
//! Per connection the selector runs a fixed task population: one audio
//! distributor, one transcription collector per live session, and one
//! heuristic selector. All communication is over bounded queues; shutdown is
//! a watch signal every task observes.

mod collector;
mod distributor;
mod heuristic;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::core::provider::{
    Provider, Session, SessionConfig, SessionError, SessionResult, TranscriptionResult,
};

use heuristic::ScoreBoard;

/// Errors surfaced while constructing a selector.
#[derive(Debug, Error)]
pub enum SelectorError {
    /// Every requested provider failed to produce a session.
    #[error("no providers available")]
    NoProvidersAvailable,
}

/// Queue capacities and timing for one selector.
///
/// The defaults are the production values; tests shrink the intervals to
/// compress time.
#[derive(Debug, Clone)]
pub struct SelectorOptions {
    /// Inbound audio queue capacity
    pub audio_queue_capacity: usize,
    /// Shared inbound result queue capacity
    pub result_queue_capacity: usize,
    /// Outbound result queue capacity
    pub output_queue_capacity: usize,
    /// How often the active provider is re-scored
    pub score_interval: Duration,
    /// How far back a result still counts towards scoring
    pub score_window: Duration,
    /// How long results are retained for handover catch-up; strictly larger
    /// than the scoring window so a handover still has material to flush
    pub history_window: Duration,
}

impl Default for SelectorOptions {
    fn default() -> Self {
        Self {
            audio_queue_capacity: 100,
            result_queue_capacity: 100,
            output_queue_capacity: 10,
            score_interval: Duration::from_secs(2),
            score_window: Duration::from_secs(2),
            history_window: Duration::from_secs(5),
        }
    }
}

/// Multiplexer over several provider sessions presenting as one.
pub struct ProviderSelector {
    audio_tx: std::sync::Mutex<Option<mpsc::Sender<Bytes>>>,
    output_rx: Mutex<mpsc::Receiver<TranscriptionResult>>,
    shutdown_tx: watch::Sender<bool>,
    sessions: Vec<(String, Arc<dyn Session>)>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ProviderSelector {
    /// Create a selector with default options.
    pub async fn new(
        providers: &[Arc<dyn Provider>],
        config: &SessionConfig,
    ) -> Result<Self, SelectorError> {
        Self::with_options(providers, config, SelectorOptions::default()).await
    }

    /// Create a selector, building one session per provider.
    ///
    /// Providers whose session construction fails are logged and skipped.
    /// The first provider that succeeds becomes the initial active provider.
    pub async fn with_options(
        providers: &[Arc<dyn Provider>],
        config: &SessionConfig,
        options: SelectorOptions,
    ) -> Result<Self, SelectorError> {
        let mut sessions: Vec<(String, Arc<dyn Session>)> = Vec::with_capacity(providers.len());

        for provider in providers {
            match provider.new_session(config).await {
                Ok(session) => sessions.push((provider.name().to_string(), session)),
                Err(err) => {
                    warn!(
                        provider = %provider.name(),
                        error = %err,
                        "failed to create session, skipping provider"
                    );
                }
            }
        }

        if sessions.is_empty() {
            return Err(SelectorError::NoProvidersAvailable);
        }

        let (audio_tx, audio_rx) = mpsc::channel(options.audio_queue_capacity);
        let (result_tx, result_rx) = mpsc::channel(options.result_queue_capacity);
        let (output_tx, output_rx) = mpsc::channel(options.output_queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tasks = Vec::with_capacity(sessions.len() + 2);

        tasks.push(tokio::spawn(distributor::run(audio_rx, sessions.clone())));

        let board = ScoreBoard::new(sessions[0].0.clone(), &options);
        tasks.push(tokio::spawn(heuristic::run(
            result_rx,
            output_tx,
            shutdown_rx.clone(),
            board,
            options.score_interval,
        )));

        for (name, session) in &sessions {
            tasks.push(tokio::spawn(collector::run(
                name.clone(),
                Arc::clone(session),
                result_tx.clone(),
                shutdown_rx.clone(),
            )));
        }

        Ok(Self {
            audio_tx: std::sync::Mutex::new(Some(audio_tx)),
            output_rx: Mutex::new(output_rx),
            shutdown_tx,
            sessions,
            tasks: Mutex::new(tasks),
            closed: AtomicBool::new(false),
        })
    }

    /// Number of sessions that survived construction.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Enqueue one audio frame for distribution to every live session.
    ///
    /// Blocks while the audio queue is full; returns
    /// [`SessionError::StreamClosed`] once the selector has been closed.
    pub async fn send_audio(&self, frame: Bytes) -> SessionResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SessionError::StreamClosed);
        }

        let sender = {
            let guard = self.audio_tx.lock().expect("audio sender lock");
            guard.clone()
        };

        match sender {
            Some(sender) => sender
                .send(frame)
                .await
                .map_err(|_| SessionError::StreamClosed),
            None => Err(SessionError::StreamClosed),
        }
    }

    /// Dequeue the next forwarded transcription result.
    ///
    /// Returns `Ok(None)` once the selector has been closed and the outbound
    /// queue has drained.
    pub async fn receive_transcription(&self) -> SessionResult<Option<TranscriptionResult>> {
        let mut output = self.output_rx.lock().await;
        Ok(output.recv().await)
    }

    /// Close the selector and every session behind it.
    ///
    /// Idempotent. Callers must ensure no further `send_audio` is in flight
    /// (the connection manager only closes after its inbound loop exits).
    /// Order matters: signal shutdown, close the audio queue so the
    /// distributor drains, close every session so collectors unblock, then
    /// join all internal tasks. The heuristic task dropping its sender is
    /// what turns `receive_transcription` into end-of-stream.
    pub async fn close(&self) -> SessionResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        info!("closing provider selector");

        let _ = self.shutdown_tx.send(true);
        self.audio_tx.lock().expect("audio sender lock").take();

        for (name, session) in &self.sessions {
            if let Err(err) = session.close().await {
                warn!(provider = %name, error = %err, "error closing session");
            }
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }

        Ok(())
    }
}

#[async_trait]
impl Session for ProviderSelector {
    async fn send_audio(&self, frame: Bytes) -> SessionResult<()> {
        ProviderSelector::send_audio(self, frame).await
    }

    async fn receive_transcription(&self) -> SessionResult<Option<TranscriptionResult>> {
        ProviderSelector::receive_transcription(self).await
    }

    async fn close(&self) -> SessionResult<()> {
        ProviderSelector::close(self).await
    }
}
