//! Best-effort storage collaborators.
//!
//! The engine never depends on these for correctness: every read has an
//! explicit `Unavailable` outcome and every write failure is swallowed by
//! the caller after logging.

mod clickhouse_history;
mod memory;
mod redis_cache;

pub use clickhouse_history::ClickHouseEventHistory;
pub use memory::{InMemoryEventHistory, InMemoryRecommendationCache};
pub use redis_cache::RedisRecommendationCache;

use crate::error::StoreResult;
use crate::models::{EngagementEvent, Recommendation};
use async_trait::async_trait;
use std::fmt;

/// Outcome of a best-effort read.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<T> {
    Found(T),
    Absent,
    Unavailable(String),
}

impl<T> Fetch<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Fetch::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Fetch::Unavailable(_))
    }
}

/// Identifies one cached list: a user's top-k under a given model version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecommendationKey {
    pub model_version: u64,
    pub user_id: String,
    pub top_k: usize,
}

/// Redis layout: `rec:v{model_version}:{user_id}:{top_k}`.
impl fmt::Display for RecommendationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rec:v{}:{}:{}", self.model_version, self.user_id, self.top_k)
    }
}

pub fn recommendation_key(model_version: u64, user_id: &str, top_k: usize) -> RecommendationKey {
    RecommendationKey {
        model_version,
        user_id: user_id.to_string(),
        top_k,
    }
}

/// Durable engagement log.
#[async_trait]
pub trait EventHistory: Send + Sync {
    /// Full event history used for retraining.
    async fn load_all_events(&self) -> Fetch<Vec<EngagementEvent>>;

    async fn store_event(&self, event: &EngagementEvent) -> StoreResult<()>;

    async fn is_available(&self) -> bool;
}

/// Cached recommendation lists.
#[async_trait]
pub trait RecommendationCache: Send + Sync {
    async fn get_cached(&self, key: &RecommendationKey) -> Fetch<Vec<Recommendation>>;

    async fn put_cached(
        &self,
        key: &RecommendationKey,
        recommendations: &[Recommendation],
    ) -> StoreResult<()>;

    async fn is_available(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendation_key_format() {
        assert_eq!(
            recommendation_key(3, "user123", 10).to_string(),
            "rec:v3:user123:10"
        );
    }

    #[test]
    fn test_fetch_found() {
        assert_eq!(Fetch::Found(1).found(), Some(1));
        assert_eq!(Fetch::<i32>::Absent.found(), None);
        assert!(Fetch::<i32>::Unavailable("down".into()).is_unavailable());
    }
}
