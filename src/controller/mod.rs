//! The reconciliation scheduler around the engine.
//!
//! The controller owns the registered instances and the loaded operator
//! versions. Each instance has its own lock so ticks of one instance never
//! overlap, while different instances tick concurrently.

use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use crate::cluster::ClusterClient;
use crate::engine::{execute_plan, ActivePlan, ExecutionContext, ExecutionOutcome};
use crate::error::ControllerError;
use crate::health::{HealthRegistry, INSTANCE_KIND, PLAN_EXECUTION_API_VERSION};
use crate::log::{DefaultBus, Event, EventBus, FanoutBus, LogStorage, RedisEventBus};
use crate::model::{
    ExecutionMetadata, ExecutionState, Instance, OperatorVersion, OwnerReference, PlanExecutionStatus,
};
use crate::nats::{NatsClient, NatsEventBus};
use crate::render::Renderer;
use crate::state::tracker::{self, PersistedInstance};
use crate::state::RedisClient;

/// `<namespace>/<name>`
pub fn instance_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

/// One registered instance and where its plan stands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    pub instance: Instance,
    pub plan_execution_id: String,
    pub status: PlanExecutionStatus,
    pub last_error: Option<String>,
    pub ticks: u64,
}

impl InstanceRecord {
    fn persisted(&self) -> PersistedInstance {
        PersistedInstance {
            instance: self.instance.clone(),
            plan_execution_id: self.plan_execution_id.clone(),
            status: self.status.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    pub namespace: String,
    pub name: String,
    pub operator_version: String,
    pub plan: String,
    pub state: ExecutionState,
    pub last_error: Option<String>,
}

impl From<&InstanceRecord> for InstanceSummary {
    fn from(record: &InstanceRecord) -> Self {
        Self {
            namespace: record.instance.namespace.clone(),
            name: record.instance.name.clone(),
            operator_version: record.instance.operator_version.clone(),
            plan: record.instance.plan.clone(),
            state: record.status.state,
            last_error: record.last_error.clone(),
        }
    }
}

#[derive(Default)]
struct Metrics {
    ticks: AtomicU64,
    tick_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub tick_errors: u64,
    pub instances: usize,
    pub complete: usize,
}

pub struct Controller {
    client: Arc<dyn ClusterClient>,
    renderer: Renderer,
    health: HealthRegistry,
    operators: RwLock<HashMap<String, Arc<OperatorVersion>>>,
    instances: RwLock<BTreeMap<String, Arc<Mutex<InstanceRecord>>>>,
    redis: Option<RedisClient>,
    tenant: String,
    log_storage: Option<LogStorage>,
    nats: Option<NatsClient>,
    extra_sink: Option<Arc<dyn EventBus>>,
    metrics: Metrics,
}

impl Controller {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self {
            client,
            renderer: Renderer::default(),
            health: HealthRegistry::default(),
            operators: RwLock::new(HashMap::new()),
            instances: RwLock::new(BTreeMap::new()),
            redis: None,
            tenant: "global".to_string(),
            log_storage: None,
            nats: None,
            extra_sink: None,
            metrics: Metrics::default(),
        }
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    /// Persist statuses under `tenant` and store event logs.
    pub fn with_redis(mut self, redis: RedisClient, tenant: &str) -> Self {
        self.log_storage = Some(LogStorage::new(redis.clone(), tenant.to_string()));
        self.redis = Some(redis);
        self.tenant = tenant.to_string();
        self
    }

    pub fn with_nats(mut self, nats: NatsClient) -> Self {
        self.nats = Some(nats);
        self
    }

    /// An additional sink receiving every event of every tick.
    pub fn with_events(mut self, sink: Arc<dyn EventBus>) -> Self {
        self.extra_sink = Some(sink);
        self
    }

    pub async fn add_operator(&self, operator: OperatorVersion) {
        let name = operator.full_name();
        self.operators.write().await.insert(name, Arc::new(operator));
    }

    pub async fn operator_versions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.operators.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn operator(&self, full_name: &str) -> Result<Arc<OperatorVersion>, ControllerError> {
        self.operators
            .read()
            .await
            .get(full_name)
            .cloned()
            .ok_or_else(|| ControllerError::UnknownOperatorVersion(full_name.to_string()))
    }

    async fn record(&self, key: &str) -> Result<Arc<Mutex<InstanceRecord>>, ControllerError> {
        self.instances
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| ControllerError::UnknownInstance(key.to_string()))
    }

    /// Registers (or re-registers) an instance.
    ///
    /// Progress is kept when the instance already runs, or has persisted
    /// progress for, the same operator version and plan.
    pub async fn register(&self, mut instance: Instance) -> Result<InstanceSummary, ControllerError> {
        if instance.name.is_empty() || instance.namespace.is_empty() {
            return Err(ControllerError::InvalidInstance(
                "name and namespace are required".to_string(),
            ));
        }
        let operator = self.operator(&instance.operator_version).await?;
        let plan = operator
            .plans
            .get(&instance.plan)
            .ok_or_else(|| ControllerError::UnknownPlan {
                plan: instance.plan.clone(),
                operator_version: instance.operator_version.clone(),
            })?;
        let key = instance_key(&instance.namespace, &instance.name);

        let current = self.instances.read().await.get(&key).cloned();
        let existing = match current {
            Some(record) => Some(record.lock().await.persisted()),
            None => self.load_persisted(&instance).await,
        };
        let resumed = existing.filter(|prev| {
            prev.instance.operator_version == instance.operator_version
                && prev.instance.plan == instance.plan
                && prev.status.mirrors(plan)
        });

        if instance.uid.is_none() {
            instance.uid = resumed
                .as_ref()
                .and_then(|prev| prev.instance.uid.clone())
                .or_else(|| Some(uuid::Uuid::new_v4().to_string()));
        }
        let (plan_execution_id, status) = match resumed {
            Some(prev) => (prev.plan_execution_id, prev.status),
            None => (
                uuid::Uuid::new_v4().to_string(),
                PlanExecutionStatus::for_plan(&instance.plan, plan),
            ),
        };

        let record = InstanceRecord {
            instance,
            plan_execution_id,
            status,
            last_error: None,
            ticks: 0,
        };
        self.persist(&record).await;
        let summary = InstanceSummary::from(&record);
        self.event_bus(&record.instance).publish(Event::InstanceRegistered {
            instance: key.clone(),
            plan: record.instance.plan.clone(),
        });
        self.instances.write().await.insert(key, Arc::new(Mutex::new(record)));
        Ok(summary)
    }

    pub async fn unregister(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        let key = instance_key(namespace, name);
        self.instances
            .write()
            .await
            .remove(&key)
            .ok_or(ControllerError::UnknownInstance(key))?;
        if let Some(redis) = &self.redis {
            tracker::remove_status(redis, &self.tenant, namespace, name).await;
        }
        Ok(())
    }

    pub async fn list(&self) -> Vec<InstanceSummary> {
        let records: Vec<_> = self.instances.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(records.len());
        for record in records {
            summaries.push(InstanceSummary::from(&*record.lock().await));
        }
        summaries
    }

    pub async fn status(&self, namespace: &str, name: &str) -> Result<InstanceRecord, ControllerError> {
        let record = self.record(&instance_key(namespace, name)).await?;
        let record = record.lock().await;
        Ok(record.clone())
    }

    /// Runs one engine tick for an instance and stores the new status.
    pub async fn tick(&self, namespace: &str, name: &str) -> Result<ExecutionOutcome, ControllerError> {
        let record = self.record(&instance_key(namespace, name)).await?;
        let mut record = record.lock().await;
        let operator = self.operator(&record.instance.operator_version).await?;
        let spec = operator
            .plans
            .get(&record.instance.plan)
            .cloned()
            .ok_or_else(|| ControllerError::UnknownPlan {
                plan: record.instance.plan.clone(),
                operator_version: record.instance.operator_version.clone(),
            })?;

        let plan = ActivePlan {
            name: record.instance.plan.clone(),
            status: record.status.clone(),
            spec,
            tasks: operator.tasks.clone(),
            templates: operator.templates.clone(),
            params: operator.resolve_params(&record.instance.params),
        };
        let metadata = execution_metadata(&record, &operator);
        let bus = self.event_bus(&record.instance);
        let ctx = ExecutionContext {
            client: self.client.as_ref(),
            renderer: &self.renderer,
            health: &self.health,
            events: &bus,
        };

        let outcome = execute_plan(&plan, &metadata, &ctx).await;

        self.metrics.ticks.fetch_add(1, Ordering::Relaxed);
        record.ticks += 1;
        record.status = outcome.status.clone();
        record.last_error = outcome.error.as_ref().map(|e| e.to_string());
        if let Some(err) = &outcome.error {
            self.metrics.tick_errors.fetch_add(1, Ordering::Relaxed);
            let kind = if err.is_fatal() { "fatal" } else { "transient" };
            log::warn!(target: "planexec", "tick of {} failed ({}): {}", metadata.instance_name, kind, err);
        }
        self.persist(&record).await;
        Ok(outcome)
    }

    /// Ticks every instance concurrently; returns each key with whether its tick succeeded.
    pub async fn tick_all(&self) -> Vec<(String, bool)> {
        let records: Vec<_> = self.instances.read().await.values().cloned().collect();
        let mut keys = Vec::with_capacity(records.len());
        for record in records {
            let record = record.lock().await;
            if !record.status.state.is_finished() {
                keys.push((record.instance.namespace.clone(), record.instance.name.clone()));
            }
        }

        let ticks = keys.iter().map(|(namespace, name)| async move {
            let ok = matches!(self.tick(namespace, name).await, Ok(outcome) if !outcome.is_err());
            (instance_key(namespace, name), ok)
        });
        futures::future::join_all(ticks).await
    }

    /// Ticks everything every `period` until `shutdown` is notified.
    pub async fn run(self: Arc<Self>, period: Duration, shutdown: Arc<Notify>) {
        let mut ticks = IntervalStream::new(tokio::time::interval(period));
        let stopped = shutdown.notified();
        tokio::pin!(stopped);
        stopped.as_mut().enable();

        log::info!(target: "planexec", "reconciling every {}", humantime::format_duration(period));
        loop {
            tokio::select! {
                _ = &mut stopped => break,
                tick = ticks.next() => {
                    if tick.is_none() {
                        break;
                    }
                    let results = self.tick_all().await;
                    let failed = results.iter().filter(|(_, ok)| !ok).count();
                    log::debug!(target: "planexec", "ticked {} instances, {} failed", results.len(), failed);
                }
            }
        }
        log::info!(target: "planexec", "reconcile loop stopped");
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        let summaries = self.list().await;
        MetricsSnapshot {
            ticks: self.metrics.ticks.load(Ordering::Relaxed),
            tick_errors: self.metrics.tick_errors.load(Ordering::Relaxed),
            instances: summaries.len(),
            complete: summaries.iter().filter(|s| s.state.is_finished()).count(),
        }
    }

    /// Everything needed to resume after a restart.
    pub async fn snapshot(&self) -> Vec<PersistedInstance> {
        let records: Vec<_> = self.instances.read().await.values().cloned().collect();
        let mut snapshot = Vec::with_capacity(records.len());
        for record in records {
            snapshot.push(record.lock().await.persisted());
        }
        snapshot
    }

    /// Re-registers saved instances, keeping their progress. Instances that are
    /// already registered keep their live record. Returns how many were restored.
    pub async fn restore(&self, saved: Vec<PersistedInstance>) -> usize {
        let mut restored = 0;
        for prev in saved {
            let key = instance_key(&prev.instance.namespace, &prev.instance.name);
            if self.instances.read().await.contains_key(&key) {
                log::debug!(target: "planexec", "not restoring {}: already registered", key);
                continue;
            }
            let valid = match self.operator(&prev.instance.operator_version).await {
                Ok(op) => op
                    .plans
                    .get(&prev.instance.plan)
                    .is_some_and(|plan| prev.status.mirrors(plan)),
                Err(_) => false,
            };
            if !valid {
                log::warn!(target: "planexec", "not restoring {}: operator version or plan changed", key);
                continue;
            }
            let record = InstanceRecord {
                instance: prev.instance,
                plan_execution_id: prev.plan_execution_id,
                status: prev.status,
                last_error: None,
                ticks: 0,
            };
            let inserted = match self.instances.write().await.entry(key) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => slot.insert(Arc::new(Mutex::new(record))).clone(),
            };
            self.persist(&*inserted.lock().await).await;
            restored += 1;
        }
        restored
    }

    async fn load_persisted(&self, instance: &Instance) -> Option<PersistedInstance> {
        let redis = self.redis.as_ref()?;
        tracker::load_status(redis, &self.tenant, &instance.namespace, &instance.name).await
    }

    async fn persist(&self, record: &InstanceRecord) {
        if let Some(redis) = &self.redis {
            tracker::store_status(redis, &self.tenant, &record.persisted()).await;
        }
    }

    fn event_bus(&self, instance: &Instance) -> FanoutBus {
        let key = instance_key(&instance.namespace, &instance.name);
        let mut bus = FanoutBus::new().with(Arc::new(DefaultBus));
        if let Some(storage) = &self.log_storage {
            bus = bus.with(Arc::new(RedisEventBus::new(
                storage.clone(),
                key,
                instance.plan.clone(),
            )));
        }
        if let Some(nats) = &self.nats {
            bus = bus.with(Arc::new(NatsEventBus::new(
                nats.clone(),
                instance.namespace.clone(),
                instance.name.clone(),
                instance.plan.clone(),
            )));
        }
        if let Some(sink) = &self.extra_sink {
            bus = bus.with(sink.clone());
        }
        bus
    }
}

fn execution_metadata(record: &InstanceRecord, operator: &OperatorVersion) -> ExecutionMetadata {
    let instance = &record.instance;
    ExecutionMetadata {
        instance_name: instance.name.clone(),
        instance_namespace: instance.namespace.clone(),
        operator_name: operator.name.clone(),
        operator_version_name: operator.full_name(),
        operator_version: operator.version.clone(),
        plan_execution_id: record.plan_execution_id.clone(),
        resources_owner: OwnerReference {
            api_version: PLAN_EXECUTION_API_VERSION.to_string(),
            kind: INSTANCE_KIND.to_string(),
            name: instance.name.clone(),
            uid: instance.uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        },
    }
}
