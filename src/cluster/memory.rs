use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{ClusterClient, DeletePropagation, PatchStrategy};
use crate::error::{ClusterError, Operation};
use crate::object::{ClusterObject, ObjectKey};

/// One recorded call against the in-memory cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub operation: Operation,
    pub key: ObjectKey,
    pub strategy: Option<PatchStrategy>,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<ObjectKey, ClusterObject>,
    calls: Vec<Call>,
    failures: Vec<(Operation, ObjectKey, ClusterError)>,
    next_uid: u64,
}

/// In-process cluster used by simulation mode and tests.
#[derive(Default)]
pub struct MemoryCluster {
    inner: Mutex<Inner>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Store an object directly, without recording a call.
    pub fn insert(&self, object: ClusterObject) {
        self.lock().objects.insert(object.key(), object);
    }

    pub fn object(&self, key: &ObjectKey) -> Option<ClusterObject> {
        self.lock().objects.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the server-side `status` of a stored object.
    pub fn set_status(&self, key: &ObjectKey, status: Value) -> Result<(), ClusterError> {
        let mut inner = self.lock();
        let object = inner
            .objects
            .get_mut(key)
            .ok_or_else(|| ClusterError::NotFound(key.to_string()))?;
        let mut value = object.to_value();
        if let Value::Object(map) = &mut value {
            map.insert("status".to_string(), status);
        }
        *object = ClusterObject::from_value(value).map_err(ClusterError::Serialization)?;
        Ok(())
    }

    /// Every call to `operation` on `key` fails with `error` until cleared.
    pub fn fail(&self, operation: Operation, key: ObjectKey, error: ClusterError) {
        self.lock().failures.push((operation, key, error));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Calls other than reads.
    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation != Operation::Get)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn record(
        inner: &mut Inner,
        operation: Operation,
        key: &ObjectKey,
        strategy: Option<PatchStrategy>,
    ) -> Result<(), ClusterError> {
        inner.calls.push(Call {
            operation,
            key: key.clone(),
            strategy,
        });
        match inner
            .failures
            .iter()
            .find(|(op, k, _)| *op == operation && k == key)
        {
            Some((_, _, err)) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Custom resource groups carry no strategic-merge metadata.
fn supports_strategic_merge(key: &ObjectKey) -> bool {
    let group = key.group();
    !group.contains('.') || group.ends_with(".k8s.io")
}

/// RFC 7386 JSON merge patch.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn get(&self, key: &ObjectKey) -> Result<ClusterObject, ClusterError> {
        let mut inner = self.lock();
        Self::record(&mut inner, Operation::Get, key, None)?;
        inner
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(key.to_string()))
    }

    async fn create(&self, object: &ClusterObject) -> Result<ClusterObject, ClusterError> {
        let key = object.key();
        let mut inner = self.lock();
        Self::record(&mut inner, Operation::Create, &key, None)?;
        if inner.objects.contains_key(&key) {
            return Err(ClusterError::Conflict(key.to_string()));
        }
        inner.next_uid += 1;
        let mut value = object.to_value();
        let uid = format!("uid-{}", inner.next_uid);
        merge_patch(&mut value, &serde_json::json!({ "metadata": { "uid": uid } }));
        let stored = ClusterObject::from_value(value).map_err(ClusterError::Serialization)?;
        inner.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn patch(
        &self,
        existing: &ClusterObject,
        payload: &[u8],
        strategy: PatchStrategy,
    ) -> Result<ClusterObject, ClusterError> {
        let key = existing.key();
        let mut inner = self.lock();
        Self::record(&mut inner, Operation::Patch, &key, Some(strategy))?;
        if strategy == PatchStrategy::StrategicMerge && !supports_strategic_merge(&key) {
            return Err(ClusterError::UnsupportedMediaType(key.to_string()));
        }
        let patch: Value = serde_json::from_slice(payload)?;
        let stored = inner
            .objects
            .get(&key)
            .ok_or_else(|| ClusterError::NotFound(key.to_string()))?;
        let mut value = stored.to_value();
        merge_patch(&mut value, &patch);
        let patched = ClusterObject::from_value(value).map_err(ClusterError::Serialization)?;
        inner.objects.insert(key, patched.clone());
        Ok(patched)
    }

    async fn delete(
        &self,
        object: &ClusterObject,
        _propagation: DeletePropagation,
    ) -> Result<(), ClusterError> {
        let key = object.key();
        let mut inner = self.lock();
        Self::record(&mut inner, Operation::Delete, &key, None)?;
        inner
            .objects
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| ClusterError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(api_version: &str, kind: &str, spec: Value) -> ClusterObject {
        ClusterObject::from_value(json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": { "name": "demo", "namespace": "default" },
            "spec": spec,
        }))
        .unwrap()
    }

    #[test]
    fn test_merge_patch_rfc7386() {
        let mut target = json!({"a": "b", "c": {"d": "e", "f": "g"}});
        merge_patch(&mut target, &json!({"a": "z", "c": {"f": null}}));
        assert_eq!(target, json!({"a": "z", "c": {"d": "e"}}));

        let mut target = json!({"list": [1, 2]});
        merge_patch(&mut target, &json!({"list": [3]}));
        assert_eq!(target, json!({"list": [3]}));
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let cluster = MemoryCluster::new();
        let obj = object("v1", "ConfigMap", json!({}));

        assert!(cluster.get(&obj.key()).await.unwrap_err().is_not_found());
        let stored = cluster.create(&obj).await.unwrap();
        assert_eq!(stored.str_at(&["metadata", "uid"]), Some("uid-1"));
        assert!(matches!(cluster.create(&obj).await, Err(ClusterError::Conflict(_))));

        cluster.delete(&obj, DeletePropagation::Foreground).await.unwrap();
        assert!(cluster
            .delete(&obj, DeletePropagation::Foreground)
            .await
            .unwrap_err()
            .is_not_found());
        assert_eq!(cluster.calls().len(), 5);
    }

    #[tokio::test]
    async fn test_patch_keeps_status_and_rejects_custom_strategic_merge() {
        let cluster = MemoryCluster::new();
        let deploy = object("apps/v1", "Deployment", json!({"replicas": 1}));
        cluster.insert(deploy.clone());
        cluster.set_status(&deploy.key(), json!({"readyReplicas": 1})).unwrap();

        let desired = object("apps/v1", "Deployment", json!({"replicas": 2}));
        let payload = serde_json::to_vec(&desired.to_value()).unwrap();
        let patched = cluster
            .patch(&deploy, &payload, PatchStrategy::StrategicMerge)
            .await
            .unwrap();
        assert_eq!(patched.i64_at(&["spec", "replicas"]), Some(2));
        assert_eq!(patched.i64_at(&["status", "readyReplicas"]), Some(1));

        let custom = object("planexec.dev/v1alpha1", "Instance", json!({}));
        cluster.insert(custom.clone());
        let err = cluster
            .patch(&custom, b"{}", PatchStrategy::StrategicMerge)
            .await
            .unwrap_err();
        assert!(err.is_unsupported_media_type());
        assert!(cluster.patch(&custom, b"{}", PatchStrategy::Merge).await.is_ok());

        let ingress = ObjectKey::new("networking.k8s.io/v1", "Ingress", None, "x");
        assert!(supports_strategic_merge(&ingress));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let cluster = MemoryCluster::new();
        let obj = object("v1", "Service", json!({}));
        cluster.fail(
            Operation::Create,
            obj.key(),
            ClusterError::Api { status: 500, message: "etcd down".into() },
        );
        assert!(cluster.create(&obj).await.is_err());
        cluster.clear_failures();
        assert!(cluster.create(&obj).await.is_ok());
        assert_eq!(cluster.mutating_calls().len(), 2);
    }
}
