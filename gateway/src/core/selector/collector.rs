//! Per-session transcription collector.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error};

use crate::core::provider::{Session, TranscriptionResult};

/// Pull results off one session and funnel them into the shared inbound
/// queue.
///
/// Exits cleanly on end-of-stream; any other error is logged with the
/// provider name and ends the collector. The heuristic selector never learns
/// the difference: the provider simply stops producing and the scoring
/// window ages it out.
///
/// Never blocks shutdown: with the queue full and shutdown signalled, the
/// pending result is dropped.
pub(crate) async fn run(
    provider_name: String,
    session: Arc<dyn Session>,
    results: mpsc::Sender<TranscriptionResult>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        match session.receive_transcription().await {
            Ok(Some(result)) => {
                tokio::select! {
                    sent = results.send(result) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                    _ = shutdown.changed() => return,
                }
            }
            Ok(None) => {
                debug!(provider = %provider_name, "transcription stream ended");
                return;
            }
            Err(err) => {
                error!(provider = %provider_name, error = %err, "transcription error");
                return;
            }
        }
    }
}
