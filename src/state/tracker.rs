//! Where execution progress survives restarts: Redis per instance, and a
//! snapshot file written on shutdown.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use crate::config::state_file_path;
use crate::model::{Instance, PlanExecutionStatus};
use crate::state::redis::{delete, get_json, set_json, tenant_scoped, RedisClient};

const STATUS_KEY: &str = "status";

/// What is persisted for one instance between ticks.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedInstance {
    pub instance: Instance,
    pub plan_execution_id: String,
    pub status: PlanExecutionStatus,
}

/// Redis key of an instance's status, `<tenant>:status:<namespace>/<name>`.
pub fn status_key(tenant: &str, namespace: &str, name: &str) -> String {
    tenant_scoped(tenant, &[STATUS_KEY, &format!("{}/{}", namespace, name)])
}

pub async fn store_status(client: &RedisClient, tenant: &str, record: &PersistedInstance) {
    let key = status_key(tenant, &record.instance.namespace, &record.instance.name);
    if let Err(e) = set_json(client, &key, record).await {
        log::warn!(target: "planexec", "failed to store status {}: {}", key, e);
    }
}

pub async fn load_status(
    client: &RedisClient,
    tenant: &str,
    namespace: &str,
    name: &str,
) -> Option<PersistedInstance> {
    let key = status_key(tenant, namespace, name);
    match get_json(client, &key).await {
        Ok(record) => record,
        Err(e) => {
            log::warn!(target: "planexec", "failed to load status {}: {}", key, e);
            None
        }
    }
}

pub async fn remove_status(client: &RedisClient, tenant: &str, namespace: &str, name: &str) {
    let key = status_key(tenant, namespace, name);
    if let Err(e) = delete(client, &key).await {
        log::warn!(target: "planexec", "failed to remove status {}: {}", key, e);
    }
}

pub fn save_state_file<T: Serialize>(state: &T) -> std::io::Result<()> {
    save_state_to(&state_file_path(), state)
}

pub fn load_state_file<T: DeserializeOwned>() -> Option<T> {
    load_state_from(&state_file_path())
}

pub fn save_state_to<T: Serialize>(path: &Path, state: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(path, json)
}

/// A missing or unreadable file is no state.
pub fn load_state_from<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let data = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&data) {
        Ok(state) => Some(state),
        Err(e) => {
            log::warn!(target: "planexec", "ignoring unreadable state file {}: {}", path.display(), e);
            None
        }
    }
}
