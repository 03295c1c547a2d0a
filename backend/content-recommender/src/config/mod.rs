use crate::error::{RecommenderError, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub storage: StorageConfig,
}

/// Model and retrain parameters (`RECOMMENDER_*`).
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Weight of the collaborative signal in hybrid mode.
    #[serde(default = "default_collab_weight")]
    pub collab_weight: f32,
    /// Minimum nonzero interactions before ALS is fitted, and minimum
    /// watched items before a user gets hybrid scoring.
    #[serde(default = "default_min_interactions")]
    pub min_interactions_for_collab: usize,
    #[serde(default = "default_als_factors")]
    pub als_factors: usize,
    #[serde(default = "default_als_iterations")]
    pub als_iterations: usize,
    #[serde(default = "default_als_regularization")]
    pub als_regularization: f32,
    /// Confidence scaling applied to interaction weights.
    #[serde(default = "default_als_alpha")]
    pub als_alpha: f32,
    #[serde(default = "default_als_seed")]
    pub als_seed: u64,
    /// Accepted events between automatic retrains.
    #[serde(default = "default_retrain_threshold")]
    pub retrain_threshold: usize,
    #[serde(default = "default_retrain_queue_capacity")]
    pub retrain_queue_capacity: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,
    /// Bundled seed interactions; set to an empty string to start unseeded.
    #[serde(default = "default_seed_events_path")]
    pub seed_events_path: Option<String>,
    /// Upper bound on accepted events kept in memory for retraining.
    #[serde(default = "default_max_retained_events")]
    pub max_retained_events: usize,
}

fn default_collab_weight() -> f32 {
    0.7
}
fn default_min_interactions() -> usize {
    5
}
fn default_als_factors() -> usize {
    50
}
fn default_als_iterations() -> usize {
    20
}
fn default_als_regularization() -> f32 {
    0.1
}
fn default_als_alpha() -> f32 {
    1.0
}
fn default_als_seed() -> u64 {
    42
}
fn default_retrain_threshold() -> usize {
    50
}
fn default_retrain_queue_capacity() -> usize {
    1
}
fn default_top_k() -> usize {
    10
}
fn default_catalog_path() -> String {
    "data/catalog.json".to_string()
}
fn default_seed_events_path() -> Option<String> {
    Some("data/seed_events.json".to_string())
}
fn default_max_retained_events() -> usize {
    100_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collab_weight: default_collab_weight(),
            min_interactions_for_collab: default_min_interactions(),
            als_factors: default_als_factors(),
            als_iterations: default_als_iterations(),
            als_regularization: default_als_regularization(),
            als_alpha: default_als_alpha(),
            als_seed: default_als_seed(),
            retrain_threshold: default_retrain_threshold(),
            retrain_queue_capacity: default_retrain_queue_capacity(),
            top_k: default_top_k(),
            catalog_path: default_catalog_path(),
            seed_events_path: default_seed_events_path(),
            max_retained_events: default_max_retained_events(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.collab_weight) {
            return Err(RecommenderError::Config(format!(
                "collab_weight must be within [0, 1], got {}",
                self.collab_weight
            )));
        }
        if self.als_factors == 0 {
            return Err(RecommenderError::Config(
                "als_factors must be positive".to_string(),
            ));
        }
        if self.retrain_threshold == 0 {
            return Err(RecommenderError::Config(
                "retrain_threshold must be positive".to_string(),
            ));
        }
        if self.retrain_queue_capacity == 0 {
            return Err(RecommenderError::Config(
                "retrain_queue_capacity must be positive".to_string(),
            ));
        }
        if self.max_retained_events == 0 {
            return Err(RecommenderError::Config(
                "max_retained_events must be positive".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(RecommenderError::Config(
                "top_k must be positive".to_string(),
            ));
        }
        if self.als_regularization < 0.0 {
            return Err(RecommenderError::Config(
                "als_regularization must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Best-effort collaborators (`STORAGE_*`). Unset URLs fall back to
/// in-memory stand-ins.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub clickhouse_url: Option<String>,
    #[serde(default = "default_clickhouse_database")]
    pub clickhouse_database: String,
    #[serde(default = "default_clickhouse_user")]
    pub clickhouse_user: String,
    #[serde(default)]
    pub clickhouse_password: String,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_clickhouse_database() -> String {
    "recommender_db".to_string()
}
fn default_clickhouse_user() -> String {
    "default".to_string()
}
fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            clickhouse_url: None,
            clickhouse_database: default_clickhouse_database(),
            clickhouse_user: default_clickhouse_user(),
            clickhouse_password: String::new(),
            redis_url: None,
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let engine: EngineConfig = envy::prefixed("RECOMMENDER_").from_env()?;
        engine.validate()?;
        let storage: StorageConfig = envy::prefixed("STORAGE_").from_env()?;

        Ok(Config { engine, storage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.collab_weight, 0.7);
        assert_eq!(config.min_interactions_for_collab, 5);
        assert_eq!(config.retrain_threshold, 50);
        assert_eq!(
            config.seed_events_path.as_deref(),
            Some("data/seed_events.json")
        );
    }

    #[test]
    fn test_seed_events_on_by_default_from_env() {
        let config: EngineConfig = envy::prefixed("RECOMMENDER_")
            .from_iter(Vec::<(String, String)>::new())
            .expect("config should parse");
        assert_eq!(
            config.seed_events_path.as_deref(),
            Some("data/seed_events.json")
        );
        assert_eq!(config.max_retained_events, 100_000);
    }

    #[test]
    fn test_rejects_zero_retained_events() {
        let config = EngineConfig {
            max_retained_events: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_weight() {
        let config = EngineConfig {
            collab_weight: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RecommenderError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let config = EngineConfig {
            retrain_threshold: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_envy_reads_prefixed_values() {
        let vars = vec![
            ("RECOMMENDER_COLLAB_WEIGHT".to_string(), "0.5".to_string()),
            ("RECOMMENDER_RETRAIN_THRESHOLD".to_string(), "3".to_string()),
        ];
        let config: EngineConfig = envy::prefixed("RECOMMENDER_")
            .from_iter(vars)
            .expect("config should parse");
        assert_eq!(config.collab_weight, 0.5);
        assert_eq!(config.retrain_threshold, 3);
        assert_eq!(config.als_factors, 50);
    }
}
