//! Audio distributor.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::provider::{Session, SessionError};

struct DeliveryTarget {
    name: String,
    session: Arc<dyn Session>,
    alive: bool,
}

/// Fan each audio frame out to every live session.
///
/// One delivery task per session per frame, each handed a private copy of
/// the frame buffer; providers may retain or mutate what they are given.
/// All deliveries complete before the next frame is dequeued, so a provider
/// slower than frame cadence pushes back on the producer instead of growing
/// a queue.
///
/// A session answering end-of-stream is dropped from delivery silently; any
/// other failure is logged and likewise stops further frames to that session
/// without tearing the distributor down. Its collector will observe the end
/// of the stream on its own.
///
/// Exits when the audio queue closes.
pub(crate) async fn run(
    mut audio_rx: mpsc::Receiver<Bytes>,
    sessions: Vec<(String, Arc<dyn Session>)>,
) {
    let mut targets: Vec<DeliveryTarget> = sessions
        .into_iter()
        .map(|(name, session)| DeliveryTarget {
            name,
            session,
            alive: true,
        })
        .collect();

    while let Some(frame) = audio_rx.recv().await {
        let mut deliveries = Vec::with_capacity(targets.len());

        for (index, target) in targets.iter().enumerate() {
            if !target.alive {
                continue;
            }

            let session = Arc::clone(&target.session);
            let name = target.name.clone();
            let copy = Bytes::copy_from_slice(&frame);

            deliveries.push(tokio::spawn(async move {
                match session.send_audio(copy).await {
                    Ok(()) => (index, true),
                    Err(SessionError::StreamClosed) => (index, false),
                    Err(err) => {
                        warn!(provider = %name, error = %err, "audio send failed");
                        (index, false)
                    }
                }
            }));
        }

        for delivery in deliveries {
            if let Ok((index, alive)) = delivery.await {
                if !alive {
                    targets[index].alive = false;
                }
            }
        }
    }

    debug!("audio distributor exited");
}
