// ============================================
// ClickHouse Event History
// ============================================
//
// Durable engagement log backing retrains. Writes go to `user_events`
// (MergeTree, 90 day TTL); reads pull the full table. Any failure is
// reported as `Fetch::Unavailable` so the engine can fall back to its own
// retained buffer.

use super::{EventHistory, Fetch};
use crate::config::StorageConfig;
use crate::error::StoreResult;
use crate::models::{EngagementEvent, EventType};
use async_trait::async_trait;
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub struct ClickHouseEventHistory {
    client: Client,
    database: String,
}

#[derive(Debug, Row, Serialize, Deserialize)]
struct UserEventRow {
    user_id: String,
    item_id: String,
    event_type: String,
    value: f32,
}

impl ClickHouseEventHistory {
    pub fn new(url: &str, database: &str, username: &str, password: &str) -> Self {
        let client = Client::default()
            .with_url(url)
            .with_database(database)
            .with_user(username)
            .with_password(password);

        info!(url = url, database = database, "ClickHouseEventHistory initialized");

        Self {
            client,
            database: database.to_string(),
        }
    }

    /// `None` when no ClickHouse URL is configured.
    pub fn from_config(config: &StorageConfig) -> Option<Self> {
        config.clickhouse_url.as_deref().map(|url| {
            Self::new(
                url,
                &config.clickhouse_database,
                &config.clickhouse_user,
                &config.clickhouse_password,
            )
        })
    }

    /// Create the events table if it does not exist.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        let query = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {}.user_events (
                timestamp   DateTime DEFAULT now(),
                user_id     String,
                item_id     String,
                event_type  LowCardinality(String),
                value       Float32
            )
            ENGINE = MergeTree()
            ORDER BY (user_id, timestamp)
            PARTITION BY toYYYYMM(timestamp)
            TTL timestamp + INTERVAL 90 DAY
            "#,
            self.database
        );

        self.client.query(&query).execute().await?;
        info!(database = %self.database, "ClickHouse user_events table ready");
        Ok(())
    }
}

#[async_trait]
impl EventHistory for ClickHouseEventHistory {
    async fn load_all_events(&self) -> Fetch<Vec<EngagementEvent>> {
        let query = format!(
            "SELECT user_id, item_id, event_type, value FROM {}.user_events",
            self.database
        );

        match self.client.query(&query).fetch_all::<UserEventRow>().await {
            Ok(rows) if rows.is_empty() => Fetch::Absent,
            Ok(rows) => {
                debug!(count = rows.len(), "Loaded events from ClickHouse");
                Fetch::Found(
                    rows.into_iter()
                        .map(|row| {
                            EngagementEvent::new(
                                row.user_id,
                                row.item_id,
                                EventType::from_stored(&row.event_type),
                                row.value,
                            )
                        })
                        .collect(),
                )
            }
            Err(e) => {
                warn!(error = %e, "Failed to load events from ClickHouse");
                Fetch::Unavailable(e.to_string())
            }
        }
    }

    async fn store_event(&self, event: &EngagementEvent) -> StoreResult<()> {
        let row = UserEventRow {
            user_id: event.user_id.clone(),
            item_id: event.item_id.clone(),
            event_type: event.event_type.as_str().to_string(),
            value: event.value,
        };

        let mut insert = self.client.insert("user_events")?;
        insert.write(&row).await?;
        insert.end().await?;
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.client.query("SELECT 1").execute().await.is_ok()
    }
}
