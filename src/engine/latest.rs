//! Latest-wins prediction runner for interactive callers.
//!
//! Each keystroke-driven recomputation supersedes the one before it. Work
//! runs on Tokio's blocking pool; a result is published only if no newer
//! submission has been made in the meantime, otherwise it is dropped.
//! The predictor itself knows nothing about this.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::Predictor;
use crate::types::{Observations, PredictionSet};

/// Most recent published prediction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Published {
    /// Submission number that produced `prediction` (0 = nothing yet).
    pub generation: u64,
    pub prediction: Option<PredictionSet>,
}

#[derive(Debug)]
struct Shared {
    latest: AtomicU64,
    tx: watch::Sender<Published>,
}

impl Shared {
    /// Publish a finished prediction unless it has been superseded.
    ///
    /// The generation check and the write both happen under the channel's
    /// lock.
    fn publish(&self, generation: u64, prediction: PredictionSet) -> bool {
        self.tx.send_if_modified(|current| {
            let latest = self.latest.load(Ordering::SeqCst);
            if generation != latest || generation <= current.generation {
                debug!(generation, latest, "Discarding superseded prediction");
                return false;
            }
            *current = Published {
                generation,
                prediction: Some(prediction),
            };
            true
        })
    }
}

/// Runs predictions off the caller's thread, keeping only the newest.
#[derive(Debug, Clone)]
pub struct LatestPredictions {
    predictor: Predictor,
    shared: Arc<Shared>,
}

impl LatestPredictions {
    pub fn new(predictor: Predictor) -> Self {
        let (tx, _rx) = watch::channel(Published::default());
        Self {
            predictor,
            shared: Arc::new(Shared {
                latest: AtomicU64::new(0),
                tx,
            }),
        }
    }

    /// Receiver that always holds the newest published prediction.
    pub fn subscribe(&self) -> watch::Receiver<Published> {
        self.shared.tx.subscribe()
    }

    /// Number of the most recent submission.
    pub fn latest_generation(&self) -> u64 {
        self.shared.latest.load(Ordering::SeqCst)
    }

    /// Start a prediction that supersedes every earlier submission.
    ///
    /// The handle resolves to `true` if this prediction was published.
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, obs: Observations) -> JoinHandle<bool> {
        let generation = self.shared.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let predictor = self.predictor.clone();
        let shared = Arc::clone(&self.shared);
        debug!(generation, observed = obs.observed_count(), "Prediction submitted");
        tokio::task::spawn_blocking(move || {
            let prediction = predictor.predict(&obs);
            shared.publish(generation, prediction)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
