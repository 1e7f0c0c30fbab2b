//! Readiness of applied objects, dispatched on object kind.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cluster::ClusterClient;
use crate::error::HealthError;
use crate::model::ExecutionState;
use crate::object::{ClusterObject, ObjectKey};

pub const INSTANCE_KIND: &str = "Instance";
pub const PLAN_EXECUTION_KIND: &str = "PlanExecution";
pub const PLAN_EXECUTION_API_VERSION: &str = "planexec.dev/v1alpha1";

#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// `Ok(())` means healthy.
    async fn check(&self, client: &dyn ClusterClient, object: &ClusterObject) -> Result<(), HealthError>;
}

/// Healthy once the ready replica count reaches the requested count.
pub struct ReplicaChecker;

#[async_trait]
impl HealthChecker for ReplicaChecker {
    async fn check(&self, _client: &dyn ClusterClient, object: &ClusterObject) -> Result<(), HealthError> {
        let desired = object.i64_at(&["spec", "replicas"]).ok_or_else(|| {
            HealthError::NotReady(format!(
                "{} {} has no replica count set, so it can't be healthy",
                object.kind(),
                object.name()
            ))
        })?;
        let ready = object.i64_at(&["status", "readyReplicas"]).unwrap_or(0);
        if ready == desired {
            Ok(())
        } else {
            Err(HealthError::NotReady(format!(
                "ready replicas ({}) does not equal requested replicas ({})",
                ready, desired
            )))
        }
    }
}

/// Healthy once exactly one pod succeeded.
pub struct JobChecker;

#[async_trait]
impl HealthChecker for JobChecker {
    async fn check(&self, _client: &dyn ClusterClient, object: &ClusterObject) -> Result<(), HealthError> {
        match object.i64_at(&["status", "succeeded"]) {
            Some(1) => Ok(()),
            _ => Err(HealthError::NotReady(format!(
                "job \"{}\" still running or failed",
                object.name()
            ))),
        }
    }
}

/// Healthy once the instance's active plan execution is complete.
pub struct InstanceChecker;

#[async_trait]
impl HealthChecker for InstanceChecker {
    async fn check(&self, client: &dyn ClusterClient, object: &ClusterObject) -> Result<(), HealthError> {
        let plan_name = match object.str_at(&["status", "activePlan", "name"]) {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(HealthError::NotReady(format!(
                    "instance {} does not have any active plan assigned yet",
                    object.name()
                )))
            }
        };
        let namespace = object
            .str_at(&["status", "activePlan", "namespace"])
            .filter(|ns| !ns.is_empty())
            .or(object.namespace());
        let key = ObjectKey::new(PLAN_EXECUTION_API_VERSION, PLAN_EXECUTION_KIND, namespace, plan_name);

        let plan = client.get(&key).await.map_err(|source| HealthError::Lookup {
            context: format!("instance {} active plan {} not found", object.name(), plan_name),
            source,
        })?;
        let state = plan
            .get(&["status", "state"])
            .and_then(|v| serde_json::from_value::<ExecutionState>(v.clone()).ok())
            .unwrap_or_default();
        if state.is_finished() {
            Ok(())
        } else {
            Err(HealthError::NotReady(format!(
                "instance {} active plan is in state {}",
                object.name(),
                state
            )))
        }
    }
}

/// Kinds without a readiness contract are healthy once applied.
pub struct AlwaysHealthy;

#[async_trait]
impl HealthChecker for AlwaysHealthy {
    async fn check(&self, _client: &dyn ClusterClient, _object: &ClusterObject) -> Result<(), HealthError> {
        Ok(())
    }
}

/// Kind → checker table with a fallback for unregistered kinds.
pub struct HealthRegistry {
    checkers: HashMap<String, Arc<dyn HealthChecker>>,
    fallback: Arc<dyn HealthChecker>,
}

impl HealthRegistry {
    /// A registry that knows no kinds; everything uses the fallback.
    pub fn empty() -> Self {
        Self {
            checkers: HashMap::new(),
            fallback: Arc::new(AlwaysHealthy),
        }
    }

    pub fn register(&mut self, kind: &str, checker: Arc<dyn HealthChecker>) {
        self.checkers.insert(kind.to_string(), checker);
    }

    pub fn with(mut self, kind: &str, checker: Arc<dyn HealthChecker>) -> Self {
        self.register(kind, checker);
        self
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.checkers.contains_key(kind)
    }

    pub async fn is_healthy(&self, client: &dyn ClusterClient, object: &ClusterObject) -> Result<(), HealthError> {
        let checker = self.checkers.get(object.kind()).unwrap_or(&self.fallback);
        checker.check(client, object).await
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        let replicas: Arc<dyn HealthChecker> = Arc::new(ReplicaChecker);
        Self::empty()
            .with("StatefulSet", replicas.clone())
            .with("Deployment", replicas.clone())
            .with("ReplicaSet", replicas)
            .with("Job", Arc::new(JobChecker))
            .with(INSTANCE_KIND, Arc::new(InstanceChecker))
    }
}
