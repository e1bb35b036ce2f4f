//! Active-provider selection.
//!
//! A single task owns all selection state: per-provider sequence counters,
//! per-provider result history, and the active-provider name. No other task
//! reads or writes these, so none of it is behind a lock; widening access
//! would break that invariant.
//!
//! The task waits on three events: a result arriving from a collector, the
//! scoring timer, and shutdown. Results from the active provider are
//! forwarded live; on a scoring tick the provider with the most recent
//! in-window result becomes active, and the switch flushes whatever the new
//! provider produced beyond the old provider's sequence high-water mark.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::core::provider::TranscriptionResult;

use super::SelectorOptions;

/// A transcription result tagged with its per-provider sequence number.
///
/// Sequence numbers start at 1 and are never reused within a session.
#[derive(Debug, Clone)]
pub(crate) struct SequencedResult {
    pub seq_num: u64,
    pub result: TranscriptionResult,
}

/// Selection state owned exclusively by the heuristic task.
pub(crate) struct ScoreBoard {
    active: String,
    histories: HashMap<String, Vec<SequencedResult>>,
    seq_counters: HashMap<String, u64>,
    score_window: Duration,
    history_window: Duration,
}

impl ScoreBoard {
    pub(crate) fn new(initial_active: String, options: &SelectorOptions) -> Self {
        Self {
            active: initial_active,
            histories: HashMap::new(),
            seq_counters: HashMap::new(),
            score_window: options.score_window,
            history_window: options.history_window,
        }
    }

    pub(crate) fn active(&self) -> &str {
        &self.active
    }

    pub(crate) fn set_active(&mut self, provider: String) {
        self.active = provider;
    }

    /// Record a final result: assign the next sequence number for its
    /// provider and append to that provider's history. Returns a copy to
    /// forward when the result came from the active provider.
    pub(crate) fn record(&mut self, result: TranscriptionResult) -> Option<TranscriptionResult> {
        let counter = self
            .seq_counters
            .entry(result.provider_name.clone())
            .or_insert(0);
        *counter += 1;
        let seq_num = *counter;

        let forward = (result.provider_name == self.active).then(|| result.clone());

        self.histories
            .entry(result.provider_name.clone())
            .or_default()
            .push(SequencedResult { seq_num, result });

        forward
    }

    /// The provider whose most recent in-window result is newest, if any
    /// provider produced inside the scoring window at all.
    ///
    /// A provider's recent activity is the cheapest available proxy for its
    /// end-to-end latency: the upstream APIs carry no request tracking ids,
    /// so per-request round-trip times cannot be measured directly.
    pub(crate) fn best_provider(&self, now: Instant) -> Option<&str> {
        let mut best: Option<(&str, Instant)> = None;

        for (provider, history) in &self.histories {
            for entry in history {
                if now.saturating_duration_since(entry.result.received_at) >= self.score_window {
                    continue;
                }
                // Ties keep the first provider found; indistinguishable
                // latency makes the winner arbitrary anyway.
                if best.is_none_or(|(_, ts)| entry.result.received_at > ts) {
                    best = Some((provider, entry.result.received_at));
                }
            }
        }

        best.map(|(provider, _)| provider)
    }

    /// Results the new provider produced past the old provider's highest
    /// sequence number, in sequence order. These were never forwarded while
    /// the old provider was active.
    ///
    /// With the old provider's history empty the high-water mark is zero and
    /// the new provider's whole retained history flushes.
    pub(crate) fn missed_results(&self, old: &str, new: &str) -> Vec<TranscriptionResult> {
        let last_old_seq = self
            .histories
            .get(old)
            .and_then(|history| history.last())
            .map(|entry| entry.seq_num)
            .unwrap_or(0);

        self.histories
            .get(new)
            .map(|history| {
                history
                    .iter()
                    .filter(|entry| entry.seq_num > last_old_seq)
                    .map(|entry| entry.result.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop every history entry older than the history window.
    pub(crate) fn prune(&mut self, now: Instant) {
        for history in self.histories.values_mut() {
            history.retain(|entry| {
                now.saturating_duration_since(entry.result.received_at) < self.history_window
            });
        }
    }

    #[cfg(test)]
    fn history_len(&self, provider: &str) -> usize {
        self.histories.get(provider).map_or(0, Vec::len)
    }
}

/// The heuristic selector task.
///
/// Exits when the inbound queue closes, the output consumer goes away, or
/// shutdown is signalled. Dropping `output` on exit is what turns the
/// outbound queue into end-of-stream for the consumer.
pub(crate) async fn run(
    mut inbound: mpsc::Receiver<TranscriptionResult>,
    output: mpsc::Sender<TranscriptionResult>,
    mut shutdown: watch::Receiver<bool>,
    mut board: ScoreBoard,
    score_interval: Duration,
) {
    // interval() would fire immediately; the first score should wait a full
    // period like every later one.
    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + score_interval,
        score_interval,
    );

    loop {
        tokio::select! {
            maybe_result = inbound.recv() => {
                let Some(result) = maybe_result else { break };

                // Interim results are never stored or forwarded.
                if !result.is_final {
                    continue;
                }

                if let Some(forward) = board.record(result) {
                    // Blocking enqueue: back-pressure flows to the vendors
                    // through queue fill when the client reads slowly.
                    tokio::select! {
                        sent = output.send(forward) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            }

            _ = ticker.tick() => {
                let now = Instant::now();

                if let Some(best) = board.best_provider(now) {
                    if best != board.active() {
                        let best = best.to_string();
                        info!(
                            from = %board.active(),
                            to = %best,
                            "switching active provider"
                        );

                        let mut interrupted = false;
                        for missed in board.missed_results(board.active(), &best) {
                            debug!(provider = %best, text = %missed.text, "flushing missed transcription");
                            tokio::select! {
                                sent = output.send(missed) => {
                                    if sent.is_err() {
                                        interrupted = true;
                                        break;
                                    }
                                }
                                _ = shutdown.changed() => {
                                    interrupted = true;
                                    break;
                                }
                            }
                        }
                        if interrupted {
                            break;
                        }

                        board.set_active(best);
                    }
                }

                board.prune(now);
            }

            _ = shutdown.changed() => break,
        }
    }

    debug!("heuristic selector exited");
}
