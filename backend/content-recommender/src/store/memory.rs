use super::{EventHistory, Fetch, RecommendationCache, RecommendationKey};
use crate::error::StoreResult;
use crate::models::{EngagementEvent, Recommendation};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::VecDeque;

/// Process-local event log, used when no ClickHouse is configured.
///
/// Optionally bounded: once full, the oldest events are dropped first.
#[derive(Debug, Default)]
pub struct InMemoryEventHistory {
    events: RwLock<VecDeque<EngagementEvent>>,
    max_events: Option<usize>,
}

impl InMemoryEventHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_events(max_events: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            max_events: Some(max_events.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventHistory for InMemoryEventHistory {
    async fn load_all_events(&self) -> Fetch<Vec<EngagementEvent>> {
        let events = self.events.read();
        if events.is_empty() {
            Fetch::Absent
        } else {
            Fetch::Found(events.iter().cloned().collect())
        }
    }

    async fn store_event(&self, event: &EngagementEvent) -> StoreResult<()> {
        let mut events = self.events.write();
        events.push_back(event.clone());
        if let Some(max) = self.max_events {
            while events.len() > max {
                events.pop_front();
            }
        }
        Ok(())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

/// Process-local recommendation cache, used when no Redis is configured.
///
/// Holds one slot per `(user_id, top_k)`, tagged with the model version it
/// was computed under. A newer version overwrites the slot, so the cache
/// never grows across publishes.
#[derive(Debug, Default)]
pub struct InMemoryRecommendationCache {
    entries: DashMap<(String, usize), (u64, Vec<Recommendation>)>,
}

impl InMemoryRecommendationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RecommendationCache for InMemoryRecommendationCache {
    async fn get_cached(&self, key: &RecommendationKey) -> Fetch<Vec<Recommendation>> {
        match self.entries.get(&(key.user_id.clone(), key.top_k)) {
            Some(entry) if entry.value().0 == key.model_version => {
                Fetch::Found(entry.value().1.clone())
            }
            _ => Fetch::Absent,
        }
    }

    async fn put_cached(
        &self,
        key: &RecommendationKey,
        recommendations: &[Recommendation],
    ) -> StoreResult<()> {
        if recommendations.is_empty() {
            return Ok(());
        }

        let version = key.model_version;
        self.entries
            .entry((key.user_id.clone(), key.top_k))
            .and_modify(|slot| {
                // A late writer must not replace a list from a newer model.
                if slot.0 <= version {
                    *slot = (version, recommendations.to_vec());
                }
            })
            .or_insert_with(|| (version, recommendations.to_vec()));
        Ok(())
    }

    async fn is_available(&self) -> bool {
        true
    }
}
