use super::{Fetch, RecommendationCache, RecommendationKey};
use crate::config::StorageConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::Recommendation;
use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, warn};

/// Redis-backed recommendation cache.
///
/// Lists are stored as JSON under `rec:v{model_version}:{user_id}:{top_k}`
/// with a TTL, so a new model version never serves stale lists.
pub struct RedisRecommendationCache {
    redis_client: redis::Client,
    ttl_secs: u64,
}

impl RedisRecommendationCache {
    pub fn new(redis_client: redis::Client, ttl_secs: u64) -> Self {
        Self {
            redis_client,
            ttl_secs,
        }
    }

    /// `None` when no Redis URL is configured; an invalid URL is an error.
    pub fn from_config(config: &StorageConfig) -> StoreResult<Option<Self>> {
        match config.redis_url.as_deref() {
            Some(url) => {
                let client = redis::Client::open(url)?;
                Ok(Some(Self::new(client, config.cache_ttl_secs)))
            }
            None => Ok(None),
        }
    }

    async fn connection(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        Ok(self.redis_client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl RecommendationCache for RedisRecommendationCache {
    async fn get_cached(&self, key: &RecommendationKey) -> Fetch<Vec<Recommendation>> {
        let key = key.to_string();
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Redis unavailable for recommendation lookup");
                return Fetch::Unavailable(e.to_string());
            }
        };

        let raw: Option<String> = match conn.get(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, key = %key, "Redis GET failed");
                return Fetch::Unavailable(e.to_string());
            }
        };

        match raw {
            None => Fetch::Absent,
            Some(json) => match serde_json::from_str::<Vec<Recommendation>>(&json) {
                Ok(recs) if recs.is_empty() => Fetch::Absent,
                Ok(recs) => Fetch::Found(recs),
                Err(e) => {
                    debug!(error = %e, key = %key, "Discarding undecodable cache entry");
                    Fetch::Absent
                }
            },
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

        let payload = serde_json::to_string(recommendations).map_err(StoreError::from)?;
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key.to_string(), payload, self.ttl_secs).await?;
        Ok(())
    }

    async fn is_available(&self) -> bool {
        match self.connection().await {
            Ok(mut conn) => redis::cmd("PING")
                .query_async::<_, String>(&mut conn)
                .await
                .is_ok(),
            Err(_) => false,
        }
    }
}
