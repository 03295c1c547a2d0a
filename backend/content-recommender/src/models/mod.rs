use crate::error::IngestRejection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single recommendable content item. Immutable once the catalog is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub year: i32,
    pub rating: f32,
}

/// Engagement signal kinds accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ViewStart,
    ViewComplete,
    Rating,
    Search,
    /// Only produced when decoding stored history written by an older
    /// producer; never accepted at ingest.
    Unrecognized,
}

impl EventType {
    /// Multiplier applied to `value` when folding an event into the
    /// interaction matrix.
    pub fn weight_multiplier(&self) -> f32 {
        match self {
            EventType::ViewComplete => 4.0,
            EventType::Rating => 3.0,
            EventType::ViewStart => 1.0,
            EventType::Search => 0.5,
            EventType::Unrecognized => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ViewStart => "view_start",
            EventType::ViewComplete => "view_complete",
            EventType::Rating => "rating",
            EventType::Search => "search",
            EventType::Unrecognized => "unrecognized",
        }
    }

    /// Lenient decoding for stored history: unknown labels keep their
    /// default weight instead of being dropped.
    pub fn from_stored(label: &str) -> Self {
        label.parse().unwrap_or(EventType::Unrecognized)
    }
}

impl FromStr for EventType {
    type Err = IngestRejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view_start" => Ok(EventType::ViewStart),
            "view_complete" => Ok(EventType::ViewComplete),
            "rating" => Ok(EventType::Rating),
            "search" => Ok(EventType::Search),
            other => Err(IngestRejection::UnknownEventType(other.to_string())),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event as submitted by the caller, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingEvent {
    pub user_id: String,
    pub item_id: String,
    #[serde(default = "default_event_type")]
    pub event_type: String,
    /// Watch fraction (0-1), star rating (1-5), or 1.0 for binary signals.
    #[serde(default = "default_event_value")]
    pub value: f32,
}

fn default_event_type() -> String {
    EventType::ViewComplete.as_str().to_string()
}

fn default_event_value() -> f32 {
    1.0
}

impl IncomingEvent {
    pub fn new(
        user_id: impl Into<String>,
        item_id: impl Into<String>,
        event_type: impl Into<String>,
        value: f32,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            item_id: item_id.into(),
            event_type: event_type.into(),
            value,
        }
    }
}

/// One validated observation. Append-only; never mutated or deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementEvent {
    pub user_id: String,
    pub item_id: String,
    pub event_type: EventType,
    pub value: f32,
}

impl EngagementEvent {
    pub fn new(
        user_id: impl Into<String>,
        item_id: impl Into<String>,
        event_type: EventType,
        value: f32,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            item_id: item_id.into(),
            event_type,
            value,
        }
    }

    pub fn weight(&self) -> f32 {
        self.event_type.weight_multiplier() * self.value
    }
}

/// Which signal produced a recommendation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationSource {
    Hybrid,
    Collaborative,
    Content,
    Trending,
}

impl RecommendationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationSource::Hybrid => "hybrid",
            RecommendationSource::Collaborative => "collaborative",
            RecommendationSource::Content => "content",
            RecommendationSource::Trending => "trending",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub title: String,
    pub genres: Vec<String>,
    pub tags: Vec<String>,
    pub year: i32,
    pub catalog_rating: f32,
    pub score: f32,
    pub source: RecommendationSource,
}

impl Recommendation {
    pub fn from_item(item: &CatalogItem, score: f32, source: RecommendationSource) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            genres: item.genres.clone(),
            tags: item.tags.clone(),
            year: item.year,
            catalog_rating: item.rating,
            score,
            source,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub user_id: String,
    pub recommendations: Vec<Recommendation>,
    pub model_version: u64,
    pub from_cache: bool,
}

/// Read-only summary of a published state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub algorithm: String,
    pub n_users: usize,
    pub n_items: usize,
    pub n_interactions: usize,
    pub trained_at: DateTime<Utc>,
    pub model_version: u64,
    pub als_factors: usize,
    pub als_iterations: usize,
    pub collab_weight: f32,
    pub min_interactions_for_collab: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineHealth {
    pub ready: bool,
    pub metadata: Option<TrainingMetadata>,
    pub retrain_threshold: usize,
    pub events_since_last_retrain: usize,
    pub history_available: bool,
    pub cache_available: bool,
}
