//! Owning context for the recommender.
//!
//! `RecommendationEngine` holds everything an operation needs: the
//! read-only catalog and content index, the published-state channel, the
//! retrain counter and the best-effort collaborators. Callers construct as
//! many isolated engines as they like; nothing is process-global.

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::{IngestRejection, RecommenderError, Result};
use crate::models::{
    EngagementEvent, EngineHealth, EventType, IncomingEvent, Recommendation,
    RecommendationResponse, TrainingMetadata,
};
use crate::services::content_index::ContentIndex;
use crate::services::retrain::{
    create_retrain_queue, RetrainCoordinator, RetrainWorker, StateSubscriber, TrainingPipeline,
};
use crate::services::scoring::Scorer;
use crate::services::state::RecommenderState;
use crate::store::{recommendation_key, EventHistory, Fetch, RecommendationCache};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct RecommendationEngine {
    catalog: Arc<Catalog>,
    content_index: Arc<ContentIndex>,
    scorer: Scorer,
    default_top_k: usize,
    coordinator: RetrainCoordinator,
    pipeline: Arc<TrainingPipeline>,
    state_rx: StateSubscriber,
    history: Arc<dyn EventHistory>,
    cache: Arc<dyn RecommendationCache>,
}

impl RecommendationEngine {
    /// Build the content index and start the retrain worker.
    ///
    /// Must be called from within a tokio runtime. The engine starts
    /// NotReady; call [`retrain_now`](Self::retrain_now) to publish the
    /// first state.
    pub fn new(
        catalog: Catalog,
        config: EngineConfig,
        seed_events: Vec<EngagementEvent>,
        history: Arc<dyn EventHistory>,
        cache: Arc<dyn RecommendationCache>,
    ) -> Result<(Self, RetrainWorker)> {
        config.validate()?;
        if catalog.is_empty() {
            return Err(RecommenderError::EmptyCatalog);
        }

        let catalog = Arc::new(catalog);
        let content_index = Arc::new(ContentIndex::build(&catalog)?);

        let (state_tx, state_rx) = watch::channel(None);
        let pipeline = Arc::new(TrainingPipeline::new(
            Arc::clone(&catalog),
            &config,
            seed_events,
            Arc::clone(&history),
            state_tx,
        ));

        let (job_tx, job_rx) = create_retrain_queue(config.retrain_queue_capacity);
        let coordinator = RetrainCoordinator::new(config.retrain_threshold, job_tx);
        let worker = RetrainWorker::spawn(Arc::clone(&pipeline), job_rx);

        info!(
            items = catalog.len(),
            vocabulary = content_index.vocabulary_size(),
            seed_events = pipeline.seed_len(),
            retrain_threshold = config.retrain_threshold,
            "Recommendation engine initialized"
        );

        let engine = Self {
            catalog,
            content_index,
            scorer: Scorer::from_config(&config),
            default_top_k: config.top_k,
            coordinator,
            pipeline,
            state_rx,
            history,
            cache,
        };

        Ok((engine, worker))
    }

    /// Validate and record one engagement event.
    ///
    /// Rejected events leave the engine untouched. Accepted events are kept
    /// for retraining, written to the history on a best-effort basis and
    /// counted towards the next retrain.
    pub async fn ingest(&self, event: IncomingEvent) -> Result<EngagementEvent> {
        let accepted = self.validate(event).map_err(|rejection| {
            debug!(reason = %rejection, "Event rejected");
            RecommenderError::Rejected(rejection)
        })?;

        self.pipeline.retain(accepted.clone());

        if let Err(e) = self.history.store_event(&accepted).await {
            warn!(error = %e, user_id = %accepted.user_id, "Failed to persist event");
        }

        self.coordinator.record_event();

        Ok(accepted)
    }

    fn validate(&self, event: IncomingEvent) -> std::result::Result<EngagementEvent, IngestRejection> {
        if !self.catalog.contains(&event.item_id) {
            return Err(IngestRejection::UnknownItem(event.item_id));
        }
        let event_type: EventType = event.event_type.parse()?;
        if !event.value.is_finite() {
            return Err(IngestRejection::NonFiniteValue);
        }

        Ok(EngagementEvent::new(
            event.user_id,
            event.item_id,
            event_type,
            event.value,
        ))
    }

    /// Ranked recommendations for one user.
    ///
    /// Fails with `NotReady` until a state has been published. The cache is
    /// consulted first and written back after a miss; cache trouble only
    /// costs a direct computation.
    pub async fn recommend(&self, user_id: &str, top_k: usize) -> Result<RecommendationResponse> {
        let state = self.current_state().ok_or(RecommenderError::NotReady)?;
        let model_version = state.model_version();
        let key = recommendation_key(model_version, user_id, top_k);

        match self.cache.get_cached(&key).await {
            Fetch::Found(recommendations) => {
                debug!(user_id = user_id, "Recommendation cache hit");
                return Ok(RecommendationResponse {
                    user_id: user_id.to_string(),
                    recommendations,
                    model_version,
                    from_cache: true,
                });
            }
            Fetch::Absent => {}
            Fetch::Unavailable(reason) => {
                debug!(reason = %reason, "Recommendation cache unavailable");
            }
        }

        let recommendations =
            self.scorer
                .recommend(&state, &self.catalog, &self.content_index, user_id, top_k);

        if let Err(e) = self.cache.put_cached(&key, &recommendations).await {
            debug!(error = %e, "Failed to cache recommendations");
        }

        Ok(RecommendationResponse {
            user_id: user_id.to_string(),
            recommendations,
            model_version,
            from_cache: false,
        })
    }

    /// Recommendations using the configured default list length.
    pub async fn recommend_default(&self, user_id: &str) -> Result<RecommendationResponse> {
        self.recommend(user_id, self.default_top_k).await
    }

    /// Globally popular items. Always available: falls back to catalog
    /// rating before the first publish.
    pub fn trending(&self, top_k: usize) -> Vec<Recommendation> {
        let state = self.current_state();
        self.scorer
            .trending(state.as_deref(), &self.catalog, top_k)
    }

    pub fn status(&self) -> Result<TrainingMetadata> {
        self.current_state()
            .map(|state| state.metadata.clone())
            .ok_or(RecommenderError::NotReady)
    }

    pub async fn health(&self) -> EngineHealth {
        let metadata = self.current_state().map(|state| state.metadata.clone());

        EngineHealth {
            ready: metadata.is_some(),
            metadata,
            retrain_threshold: self.coordinator.threshold(),
            events_since_last_retrain: self.coordinator.events_since_last_retrain(),
            history_available: self.history.is_available().await,
            cache_available: self.cache.is_available().await,
        }
    }

    /// Run one retrain cycle inline and return the published metadata.
    pub async fn retrain_now(&self) -> Result<TrainingMetadata> {
        let state = self.pipeline.run().await?;
        Ok(state.metadata.clone())
    }

    pub fn is_ready(&self) -> bool {
        self.state_rx.borrow().is_some()
    }

    /// Snapshot currently being served, if any.
    pub fn current_state(&self) -> Option<Arc<RecommenderState>> {
        self.state_rx.borrow().clone()
    }

    /// Watch for newly published states.
    pub fn subscribe(&self) -> StateSubscriber {
        self.state_rx.clone()
    }

    pub fn events_since_last_retrain(&self) -> usize {
        self.coordinator.events_since_last_retrain()
    }

    pub fn retrain_threshold(&self) -> usize {
        self.coordinator.threshold()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn content_index(&self) -> &ContentIndex {
        &self.content_index
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }
}
