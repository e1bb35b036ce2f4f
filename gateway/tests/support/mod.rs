//! Scripted mock provider for integration tests.
//!
//! Tests drive sessions from the outside: audio sent by the gateway is
//! recorded, and transcription results appear exactly when the test pushes
//! them, stamped at push time.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, mpsc, watch};

use chorus_gateway::core::provider::{
    Provider, Session, SessionConfig, SessionError, SessionResult, TranscriptionResult,
};

/// A provider whose sessions are remote-controlled by the test.
pub struct MockProvider {
    name: &'static str,
    fail_construction: AtomicBool,
    handles: StdMutex<Vec<Arc<MockSessionHandle>>>,
}

impl MockProvider {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail_construction: AtomicBool::new(false),
            handles: StdMutex::new(Vec::new()),
        })
    }

    /// A provider whose session construction always fails.
    pub fn failing(name: &'static str) -> Arc<Self> {
        let provider = Self::new(name);
        provider.fail_construction.store(true, Ordering::Release);
        provider
    }

    /// Handle for the most recently created session.
    pub fn latest_handle(&self) -> Option<Arc<MockSessionHandle>> {
        self.handles.lock().unwrap().last().cloned()
    }

    pub fn session_count(&self) -> usize {
        self.handles.lock().unwrap().len()
    }

    /// Wait until at least one session has been created.
    pub async fn wait_for_session(&self, timeout: Duration) -> Arc<MockSessionHandle> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(handle) = self.latest_handle() {
                return handle;
            }
            assert!(Instant::now() < deadline, "no session created in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn new_session(&self, _config: &SessionConfig) -> SessionResult<Arc<dyn Session>> {
        if self.fail_construction.load(Ordering::Acquire) {
            return Err(SessionError::ConnectionFailed(
                "mock construction failure".to_string(),
            ));
        }

        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);

        let session = Arc::new(MockSession {
            frames: StdMutex::new(Vec::new()),
            results: Mutex::new(results_rx),
            closed_tx,
            // Kept alive so `closed_tx.send` always has at least one
            // receiver, regardless of whether `receive_transcription` has
            // subscribed yet: tokio's watch sender drops the value and
            // returns `Err` when sent with zero receivers.
            _closed_rx: closed_rx,
            closed: AtomicBool::new(false),
        });

        let handle = Arc::new(MockSessionHandle {
            provider_name: self.name,
            session: session.clone(),
            results_tx: StdMutex::new(Some(results_tx)),
        });
        self.handles.lock().unwrap().push(handle);

        Ok(session)
    }
}

/// Test-side control surface for one mock session.
pub struct MockSessionHandle {
    provider_name: &'static str,
    pub session: Arc<MockSession>,
    results_tx: StdMutex<Option<mpsc::UnboundedSender<SessionResult<TranscriptionResult>>>>,
}

impl MockSessionHandle {
    /// Push a finalized result, stamped now.
    pub fn push_final(&self, text: &str, confidence: f32) {
        self.push(TranscriptionResult {
            text: text.to_string(),
            is_final: true,
            confidence,
            provider_name: self.provider_name.to_string(),
            received_at: Instant::now(),
        });
    }

    /// Push an interim result, stamped now.
    pub fn push_interim(&self, text: &str) {
        self.push(TranscriptionResult {
            text: text.to_string(),
            is_final: false,
            confidence: 0.0,
            provider_name: self.provider_name.to_string(),
            received_at: Instant::now(),
        });
    }

    fn push(&self, result: TranscriptionResult) {
        if let Some(tx) = self.results_tx.lock().unwrap().as_ref() {
            let _ = tx.send(Ok(result));
        }
    }

    /// Surface a terminal upstream error from this session.
    pub fn push_error(&self, message: &str) {
        let error = SessionError::ProviderError(message.to_string());
        if let Some(tx) = self.results_tx.lock().unwrap().take() {
            let _ = tx.send(Err(error));
        }
    }

    /// End the upstream stream gracefully.
    pub fn finish(&self) {
        self.results_tx.lock().unwrap().take();
    }

    /// Frames the gateway delivered to this session so far.
    pub fn sent_frames(&self) -> Vec<Bytes> {
        self.session.frames.lock().unwrap().clone()
    }

    /// Wait until this session has received at least `count` frames.
    pub async fn wait_for_frames(&self, count: usize, timeout: Duration) -> Vec<Bytes> {
        let deadline = Instant::now() + timeout;
        loop {
            let frames = self.sent_frames();
            if frames.len() >= count {
                return frames;
            }
            assert!(
                Instant::now() < deadline,
                "session received {} of {} expected frames",
                frames.len(),
                count
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.session.closed.load(Ordering::Acquire)
    }

    /// Wait until the gateway has closed this session.
    pub async fn wait_for_close(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while !self.is_closed() {
            assert!(Instant::now() < deadline, "session was not closed in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Session half visible to the gateway.
pub struct MockSession {
    frames: StdMutex<Vec<Bytes>>,
    results: Mutex<mpsc::UnboundedReceiver<SessionResult<TranscriptionResult>>>,
    closed_tx: watch::Sender<bool>,
    _closed_rx: watch::Receiver<bool>,
    closed: AtomicBool,
}

#[async_trait]
impl Session for MockSession {
    async fn send_audio(&self, frame: Bytes) -> SessionResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SessionError::StreamClosed);
        }
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }

    async fn receive_transcription(&self) -> SessionResult<Option<TranscriptionResult>> {
        let mut closed_rx = self.closed_tx.subscribe();
        if *closed_rx.borrow() {
            return Ok(None);
        }

        let mut results = self.results.lock().await;
        tokio::select! {
            maybe = results.recv() => match maybe {
                Some(Ok(result)) => Ok(Some(result)),
                Some(Err(err)) => Err(err),
                None => Ok(None),
            },
            _ = closed_rx.changed() => Ok(None),
        }
    }

    async fn close(&self) -> SessionResult<()> {
        self.closed.store(true, Ordering::Release);
        let _ = self.closed_tx.send(true);
        Ok(())
    }
}
