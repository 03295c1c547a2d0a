//! Background retraining.
//!
//! Ingest bumps a small counter owned by [`RetrainCoordinator`]. When the
//! counter reaches the threshold it is reset to zero and a [`RetrainJob`]
//! is offered to a bounded queue. [`RetrainWorker`] drains the queue and
//! hands each job to the [`TrainingPipeline`], which aggregates events,
//! fits ALS off the async runtime and publishes the resulting
//! [`RecommenderState`] with a single `watch` replace.
//!
//! Readers never share a lock with the pipeline: they clone the current
//! `Arc<RecommenderState>` out of the watch channel and work on that.

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::{RecommenderError, Result};
use crate::models::{EngagementEvent, TrainingMetadata};
use crate::services::aggregator::aggregate;
use crate::services::state::RecommenderState;
use crate::services::trainer::{AlsConfig, AlsTrainer};
use crate::store::{EventHistory, Fetch};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const ALGORITHM_HYBRID: &str = "ALS+ContentBased";
pub const ALGORITHM_CONTENT_ONLY: &str = "ContentBased";

/// Request for one retrain cycle.
#[derive(Debug, Clone)]
pub struct RetrainJob {
    pub requested_at: DateTime<Utc>,
    /// Counter value that fired the trigger.
    pub events_seen: usize,
}

pub type RetrainSender = mpsc::Sender<RetrainJob>;
pub type RetrainReceiver = mpsc::Receiver<RetrainJob>;

/// Sender half of the published-state channel.
pub type StatePublisher = watch::Sender<Option<Arc<RecommenderState>>>;
/// Receiver half of the published-state channel.
pub type StateSubscriber = watch::Receiver<Option<Arc<RecommenderState>>>;

pub fn create_retrain_queue(capacity: usize) -> (RetrainSender, RetrainReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Counts accepted events and fires retrain jobs at the threshold.
pub struct RetrainCoordinator {
    threshold: usize,
    counter: Mutex<usize>,
    sender: RetrainSender,
}

impl RetrainCoordinator {
    pub fn new(threshold: usize, sender: RetrainSender) -> Self {
        Self {
            threshold: threshold.max(1),
            counter: Mutex::new(0),
            sender,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn events_since_last_retrain(&self) -> usize {
        *self.counter.lock()
    }

    /// Count one accepted event. Returns `true` when this event fired the
    /// trigger, whether or not the queue accepted the job.
    pub fn record_event(&self) -> bool {
        let events_seen = {
            let mut counter = self.counter.lock();
            *counter += 1;
            if *counter < self.threshold {
                return false;
            }
            let seen = *counter;
            *counter = 0;
            seen
        };

        let job = RetrainJob {
            requested_at: Utc::now(),
            events_seen,
        };

        match self.sender.try_send(job) {
            Ok(()) => info!(events_seen, "Retrain triggered"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(events_seen, "Retrain already pending, trigger dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(events_seen, "Retrain worker stopped, trigger dropped");
            }
        }

        true
    }
}

/// Aggregate -> train -> publish.
pub struct TrainingPipeline {
    catalog: Arc<Catalog>,
    trainer: AlsTrainer,
    collab_weight: f32,
    min_interactions_for_collab: usize,
    history: Arc<dyn EventHistory>,
    seed_events: Vec<EngagementEvent>,
    retained: Mutex<VecDeque<EngagementEvent>>,
    max_retained: usize,
    publisher: StatePublisher,
    model_version: AtomicU64,
    run_lock: tokio::sync::Mutex<()>,
}

impl TrainingPipeline {
    pub fn new(
        catalog: Arc<Catalog>,
        config: &EngineConfig,
        seed_events: Vec<EngagementEvent>,
        history: Arc<dyn EventHistory>,
        publisher: StatePublisher,
    ) -> Self {
        Self {
            catalog,
            trainer: AlsTrainer::new(AlsConfig::from(config)),
            collab_weight: config.collab_weight,
            min_interactions_for_collab: config.min_interactions_for_collab,
            history,
            seed_events,
            retained: Mutex::new(VecDeque::new()),
            max_retained: config.max_retained_events.max(1),
            publisher,
            model_version: AtomicU64::new(0),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Keep an accepted event for retrains that cannot reach the history.
    /// The buffer is bounded; the oldest events go first.
    pub fn retain(&self, event: EngagementEvent) {
        let mut retained = self.retained.lock();
        retained.push_back(event);
        while retained.len() > self.max_retained {
            retained.pop_front();
        }
    }

    pub fn retained_len(&self) -> usize {
        self.retained.lock().len()
    }

    pub fn seed_len(&self) -> usize {
        self.seed_events.len()
    }

    /// Version of the most recently published state (0 before the first).
    pub fn model_version(&self) -> u64 {
        self.model_version.load(Ordering::SeqCst)
    }

    /// Run one full cycle and publish the result.
    ///
    /// Cycles are serialized; a failed ALS fit still publishes a
    /// content-only state.
    pub async fn run(self: &Arc<Self>) -> Result<Arc<RecommenderState>> {
        let _guard = self.run_lock.lock().await;
        let started = Instant::now();

        let events = self.training_events().await;
        let pipeline = Arc::clone(self);
        let state = tokio::task::spawn_blocking(move || pipeline.build_state(&events))
            .await
            .map_err(|e| RecommenderError::Training(format!("retrain task failed: {}", e)))?;

        let state = Arc::new(state);
        self.publisher.send_replace(Some(Arc::clone(&state)));

        let meta = &state.metadata;
        info!(
            algorithm = %meta.algorithm,
            n_users = meta.n_users,
            n_items = meta.n_items,
            n_interactions = meta.n_interactions,
            model_version = meta.model_version,
            duration_ms = started.elapsed().as_millis() as u64,
            "Published recommender state"
        );

        Ok(state)
    }

    /// Seed events followed by the full history, or the retained buffer
    /// when the history has nothing to offer.
    async fn training_events(&self) -> Vec<EngagementEvent> {
        let mut events = self.seed_events.clone();

        match self.history.load_all_events().await {
            Fetch::Found(history) if !history.is_empty() => {
                debug!(count = history.len(), "Training on event history");
                events.extend(history);
            }
            Fetch::Found(_) | Fetch::Absent => {
                events.extend(self.retained.lock().iter().cloned());
            }
            Fetch::Unavailable(reason) => {
                warn!(reason = %reason, "Event history unavailable, using retained events");
                events.extend(self.retained.lock().iter().cloned());
            }
        }

        events
    }

    fn build_state(&self, events: &[EngagementEvent]) -> RecommenderState {
        let matrix = aggregate(&self.catalog, events);
        let model = self.trainer.train(&matrix);
        let model_version = self.model_version.fetch_add(1, Ordering::SeqCst) + 1;

        let als = self.trainer.config();
        let metadata = TrainingMetadata {
            algorithm: if model.is_some() {
                ALGORITHM_HYBRID
            } else {
                ALGORITHM_CONTENT_ONLY
            }
            .to_string(),
            n_users: matrix.n_users(),
            n_items: self.catalog.len(),
            n_interactions: matrix.nnz(),
            trained_at: Utc::now(),
            model_version,
            als_factors: als.factors,
            als_iterations: als.iterations,
            collab_weight: self.collab_weight,
            min_interactions_for_collab: self.min_interactions_for_collab,
        };

        RecommenderState {
            matrix,
            model,
            metadata,
        }
    }
}

/// Handle to the task draining the retrain queue.
///
/// The task exits once every [`RetrainSender`] has been dropped.
pub struct RetrainWorker {
    handle: JoinHandle<()>,
}

impl RetrainWorker {
    pub fn spawn(pipeline: Arc<TrainingPipeline>, mut receiver: RetrainReceiver) -> Self {
        let handle = tokio::spawn(async move {
            info!("Retrain worker started");

            while let Some(job) = receiver.recv().await {
                let queued_ms = (Utc::now() - job.requested_at).num_milliseconds();
                debug!(events_seen = job.events_seen, queued_ms, "Retrain job received");

                if let Err(e) = pipeline.run().await {
                    warn!(error = %e, "Retrain cycle failed, keeping current state");
                }
            }

            info!("Retrain worker stopped (channel closed)");
        });

        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker to drain and exit.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Retrain worker panicked");
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}
