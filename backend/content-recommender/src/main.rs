use anyhow::{Context, Result};
use content_recommender::store::{
    ClickHouseEventHistory, InMemoryEventHistory, InMemoryRecommendationCache,
    RedisRecommendationCache,
};
use content_recommender::{
    load_seed_events, Catalog, Config, EventHistory, IncomingEvent, RecommendationCache,
    RecommendationEngine, RecommenderError,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,content_recommender=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting content-recommender");

    let config = Config::from_env().context("Failed to load configuration")?;

    let catalog = Catalog::from_json_file(&config.engine.catalog_path)
        .with_context(|| format!("Failed to load catalog from {}", config.engine.catalog_path))?;

    let seed_events = match config
        .engine
        .seed_events_path
        .as_deref()
        .filter(|path| !path.is_empty())
    {
        Some(path) => load_seed_events(path)
            .with_context(|| format!("Failed to load seed events from {}", path))?,
        None => Vec::new(),
    };

    let history = connect_history(&config).await;
    let cache = connect_cache(&config);

    let (engine, worker) =
        RecommendationEngine::new(catalog, config.engine.clone(), seed_events, history, cache)
            .context("Failed to initialize recommendation engine")?;

    let metadata = engine
        .retrain_now()
        .await
        .context("Initial training failed")?;
    info!(
        algorithm = %metadata.algorithm,
        n_users = metadata.n_users,
        n_interactions = metadata.n_interactions,
        "Engine ready"
    );

    // Optional JSON-lines event replay: one IncomingEvent per line.
    if let Some(path) = std::env::args().nth(1) {
        replay_events(&engine, &path).await?;
    }

    let trending = engine.trending(engine.default_top_k());
    println!("{}", serde_json::to_string_pretty(&trending)?);

    let health = engine.health().await;
    println!("{}", serde_json::to_string_pretty(&health)?);

    drop(engine);
    worker.join().await;

    info!("content-recommender stopped");
    Ok(())
}

async fn connect_history(config: &Config) -> Arc<dyn EventHistory> {
    match ClickHouseEventHistory::from_config(&config.storage) {
        Some(history) => {
            if let Err(e) = history.ensure_schema().await {
                warn!(error = %e, "ClickHouse schema setup failed, history may be unavailable");
            }
            Arc::new(history)
        }
        None => {
            info!("No ClickHouse configured, keeping event history in memory");
            Arc::new(InMemoryEventHistory::with_max_events(
                config.engine.max_retained_events,
            ))
        }
    }
}

fn connect_cache(config: &Config) -> Arc<dyn RecommendationCache> {
    match RedisRecommendationCache::from_config(&config.storage) {
        Ok(Some(cache)) => Arc::new(cache),
        Ok(None) => {
            info!("No Redis configured, caching recommendations in memory");
            Arc::new(InMemoryRecommendationCache::new())
        }
        Err(e) => {
            warn!(error = %e, "Invalid Redis configuration, caching in memory");
            Arc::new(InMemoryRecommendationCache::new())
        }
    }
}

async fn replay_events(engine: &RecommendationEngine, path: &str) -> Result<()> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open event file {}", path))?;
    let mut lines = BufReader::new(file).lines();

    let mut accepted = 0usize;
    let mut rejected = 0usize;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: IncomingEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Skipping malformed event line");
                rejected += 1;
                continue;
            }
        };

        match engine.ingest(event).await {
            Ok(_) => accepted += 1,
            Err(RecommenderError::Rejected(reason)) => {
                warn!(reason = %reason, "Event rejected");
                rejected += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(accepted, rejected, path = path, "Event replay finished");
    Ok(())
}
