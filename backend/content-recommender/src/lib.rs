pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

// Re-export common types
pub use catalog::{load_seed_events, Catalog};
pub use config::{Config, EngineConfig, StorageConfig};
pub use engine::RecommendationEngine;
pub use error::{IngestRejection, RecommenderError, Result, StoreError};
pub use models::{
    CatalogItem, EngagementEvent, EngineHealth, EventType, IncomingEvent, Recommendation,
    RecommendationResponse, RecommendationSource, TrainingMetadata,
};
pub use services::{RecommenderState, RetrainWorker};
pub use store::{EventHistory, Fetch, RecommendationCache, RecommendationKey};
