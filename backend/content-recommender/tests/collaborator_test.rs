use async_trait::async_trait;
use content_recommender::error::StoreResult;
use content_recommender::store::RecommendationKey;
use content_recommender::{
    Catalog, CatalogItem, EngagementEvent, EngineConfig, EventHistory, Fetch, IncomingEvent,
    Recommendation, RecommendationCache, RecommendationEngine, RecommendationSource, StoreError,
};
use mockall::mock;
use std::sync::Arc;

// ============================================
// Mock collaborators
// ============================================

mock! {
    pub History {}

    #[async_trait]
    impl EventHistory for History {
        async fn load_all_events(&self) -> Fetch<Vec<EngagementEvent>>;
        async fn store_event(&self, event: &EngagementEvent) -> StoreResult<()>;
        async fn is_available(&self) -> bool;
    }
}

mock! {
    pub Cache {}

    #[async_trait]
    impl RecommendationCache for Cache {
        async fn get_cached(&self, key: &RecommendationKey) -> Fetch<Vec<Recommendation>>;
        async fn put_cached(
            &self,
            key: &RecommendationKey,
            recommendations: &[Recommendation],
        ) -> StoreResult<()>;
        async fn is_available(&self) -> bool;
    }
}

fn catalog() -> Catalog {
    let item = |id: &str, genre: &str, rating: f32| CatalogItem {
        id: id.to_string(),
        title: format!("Title {}", id),
        genres: vec![genre.to_string()],
        tags: vec![],
        year: 1999,
        rating,
    };
    Catalog::new(vec![
        item("a", "western", 7.0),
        item("b", "western", 6.0),
        item("c", "horror", 9.0),
    ])
    .unwrap()
}

fn unavailable_history() -> MockHistory {
    let mut history = MockHistory::new();
    history
        .expect_load_all_events()
        .returning(|| Fetch::Unavailable("connection refused".to_string()));
    history
        .expect_store_event()
        .returning(|_| Err(StoreError::NotConfigured));
    history.expect_is_available().returning(|| false);
    history
}

fn unavailable_cache() -> MockCache {
    let mut cache = MockCache::new();
    cache
        .expect_get_cached()
        .returning(|_| Fetch::Unavailable("connection refused".to_string()));
    cache
        .expect_put_cached()
        .returning(|_, _| Err(StoreError::NotConfigured));
    cache.expect_is_available().returning(|| false);
    cache
}

// ============================================
// Degraded collaborators
// ============================================

#[tokio::test]
async fn test_unavailable_collaborators_degrade_to_direct_computation() {
    let (engine, _worker) = RecommendationEngine::new(
        catalog(),
        EngineConfig::default(),
        Vec::new(),
        Arc::new(unavailable_history()),
        Arc::new(unavailable_cache()),
    )
    .unwrap();

    // Persistence failure does not reject the event.
    engine
        .ingest(IncomingEvent::new("u1", "a", "view_complete", 1.0))
        .await
        .unwrap();

    // Retrain falls back to the retained buffer.
    let metadata = engine.retrain_now().await.unwrap();
    assert_eq!(metadata.n_users, 1);
    assert_eq!(metadata.n_interactions, 1);

    let response = engine.recommend("u1", 2).await.unwrap();
    assert!(!response.from_cache);
    assert_eq!(response.recommendations[0].id, "b");
    assert!(response
        .recommendations
        .iter()
        .all(|r| r.source == RecommendationSource::Content));

    let health = engine.health().await;
    assert!(health.ready);
    assert!(!health.history_available);
    assert!(!health.cache_available);
}

#[tokio::test]
async fn test_seed_events_survive_history_outage() {
    let seed = vec![
        EngagementEvent::new("seed_user", "c", content_recommender::EventType::Rating, 5.0),
    ];
    let (engine, _worker) = RecommendationEngine::new(
        catalog(),
        EngineConfig::default(),
        seed,
        Arc::new(unavailable_history()),
        Arc::new(unavailable_cache()),
    )
    .unwrap();

    let metadata = engine.retrain_now().await.unwrap();
    assert_eq!(metadata.n_users, 1);

    let trending = engine.trending(1);
    assert_eq!(trending[0].id, "c");
    assert_eq!(trending[0].score, 1.0);
}

#[tokio::test]
async fn test_cache_hit_skips_scoring_and_write_back() {
    let cached = Recommendation::from_item(
        &catalog().items()[2],
        0.42,
        RecommendationSource::Collaborative,
    );
    let expected = cached.clone();

    let mut cache = MockCache::new();
    cache
        .expect_get_cached()
        .withf(|key| key.to_string() == "rec:v1:u1:3")
        .times(1)
        .returning(move |_| Fetch::Found(vec![cached.clone()]));
    cache.expect_put_cached().never();

    let mut history = MockHistory::new();
    history.expect_load_all_events().returning(|| Fetch::Absent);

    let (engine, _worker) = RecommendationEngine::new(
        catalog(),
        EngineConfig::default(),
        Vec::new(),
        Arc::new(history),
        Arc::new(cache),
    )
    .unwrap();
    engine.retrain_now().await.unwrap();

    let response = engine.recommend("u1", 3).await.unwrap();
    assert!(response.from_cache);
    assert_eq!(response.model_version, 1);
    assert_eq!(response.recommendations, vec![expected]);
}

#[tokio::test]
async fn test_not_ready_skips_cache() {
    let mut cache = MockCache::new();
    cache.expect_get_cached().never();

    let (engine, _worker) = RecommendationEngine::new(
        catalog(),
        EngineConfig::default(),
        Vec::new(),
        Arc::new(MockHistory::new()),
        Arc::new(cache),
    )
    .unwrap();

    assert!(engine.recommend("u1", 3).await.is_err());
}
