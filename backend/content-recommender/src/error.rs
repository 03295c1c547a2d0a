use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecommenderError>;

/// Reasons an engagement event is refused at the ingest boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestRejection {
    #[error("Item '{0}' not in catalog")]
    UnknownItem(String),

    #[error("Unrecognized event type '{0}'")]
    UnknownEventType(String),

    #[error("Event value must be a finite number")]
    NonFiniteValue,
}

#[derive(Debug, Error)]
pub enum RecommenderError {
    #[error("Catalog is empty: cannot build content index")]
    EmptyCatalog,

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Recommender not ready: no state has been published yet")]
    NotReady,

    #[error("Event rejected: {0}")]
    Rejected(#[from] IngestRejection),

    #[error("Training error: {0}")]
    Training(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<envy::Error> for RecommenderError {
    fn from(err: envy::Error) -> Self {
        RecommenderError::Config(err.to_string())
    }
}

/// Failures of the best-effort storage collaborators.
///
/// These never reach engine callers; they are logged and turned into
/// `Fetch::Unavailable` or dropped.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ClickHouse error: {0}")]
    ClickHouse(#[from] clickhouse::error::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Collaborator not configured")]
    NotConfigured,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
