use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use crate::state::redis::{RedisClient, get_json};
use crate::log::Event;

const LOGS_KEY_PREFIX: &str = "logs:";
const LOGS_INDEX_KEY: &str = "logs:recent";
const MAX_INDEXED_LOGS: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
    pub instance: Option<String>,
    pub plan: Option<String>,
    pub phase: Option<String>,
}

impl LogEntry {
    pub fn new(event: Event) -> Self {
        let phase = event.phase().map(str::to_string);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
            instance: None,
            plan: None,
            phase,
        }
    }

    pub fn with_instance(mut self, instance: String) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn with_plan(mut self, plan: String) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn matches(&self, instance: Option<&str>, plan: Option<&str>) -> bool {
        let matches_instance = instance.map_or(true, |i| self.instance.as_deref() == Some(i));
        let matches_plan = plan.map_or(true, |p| self.plan.as_deref() == Some(p));
        matches_instance && matches_plan
    }
}

#[derive(Clone)]
pub struct LogStorage {
    client: RedisClient,
    tenant: String,
}

impl LogStorage {
    pub fn new(client: RedisClient, tenant: String) -> Self {
        Self { client, tenant }
    }

    fn entry_key(&self, id: &str) -> String {
        format!("{}:{}{}", self.tenant, LOGS_KEY_PREFIX, id)
    }

    fn index_key(&self) -> String {
        format!("{}:{}", self.tenant, LOGS_INDEX_KEY)
    }

    /// Store a log entry in Redis
    pub async fn store_log(&self, entry: LogEntry) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let json = serde_json::to_string(&entry)?;
        let pipe = store_pipeline(&self.entry_key(&entry.id), &self.index_key(), &entry.id, &json);
        let mut conn = self.client.lock().await;
        pipe.query_async::<_, ()>(&mut *conn).await?;
        Ok(())
    }

    /// Most recent logs first, optionally filtered.
    pub async fn get_logs(
        &self,
        instance: Option<&str>,
        plan: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<LogEntry>, Box<dyn std::error::Error + Send + Sync>> {
        let log_ids = self.get_log_ids_from_index(limit.unwrap_or(100)).await?;

        let mut logs = Vec::new();
        for log_id in log_ids {
            if let Ok(Some(entry)) = get_json::<LogEntry>(&self.client, &self.entry_key(&log_id)).await {
                if entry.matches(instance, plan) {
                    logs.push(entry);
                }
            }
        }

        Ok(logs)
    }

    async fn get_log_ids_from_index(&self, limit: usize) -> Result<Vec<String>, Box<dyn std::error::Error + Send + Sync>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = self
            .client
            .lock()
            .await
            .lrange(self.index_key(), 0, limit as isize - 1)
            .await?;
        Ok(ids)
    }
}

/// Writes the entry and pushes its id onto the capped index in one transaction.
/// The index is a list with the newest id at the head.
fn store_pipeline(entry_key: &str, index_key: &str, id: &str, json: &str) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .set(entry_key, json)
        .ignore()
        .lpush(index_key, id)
        .ignore()
        .ltrim(index_key, 0, MAX_INDEXED_LOGS as isize - 1)
        .ignore();
    pipe
}
