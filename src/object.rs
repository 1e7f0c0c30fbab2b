use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::OwnerReference;

/// Identity of an object on the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectKey {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// API group, empty for the core group (`v1`).
    pub fn group(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    pub fn version(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((_, version)) => version,
            None => &self.api_version,
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{} {}/{}", self.api_version, self.kind, ns, self.name),
            None => write!(f, "{}/{} {}", self.api_version, self.kind, self.name),
        }
    }
}

/// Built-in kinds that live outside any namespace.
pub const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "Namespace",
    "Node",
    "PersistentVolume",
    "StorageClass",
    "PriorityClass",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "APIService",
    "MutatingWebhookConfiguration",
    "ValidatingWebhookConfiguration",
    "CSIDriver",
    "IngressClass",
    "RuntimeClass",
];

pub fn is_cluster_scoped(kind: &str) -> bool {
    CLUSTER_SCOPED_KINDS.contains(&kind)
}

/// An untyped cluster object. `kind` is the discriminator health checks dispatch on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ClusterObject(Map<String, Value>);

impl ClusterObject {
    /// Wraps `value`, requiring `apiVersion`, `kind` and `metadata.name`.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let Value::Object(map) = value else {
            return Err("object must be a mapping".to_string());
        };
        let obj = Self(map);
        for (path, label) in [
            (&["apiVersion"][..], "apiVersion"),
            (&["kind"][..], "kind"),
            (&["metadata", "name"][..], "metadata.name"),
        ] {
            match obj.str_at(path) {
                Some(s) if !s.is_empty() => {}
                _ => return Err(format!("missing {}", label)),
            }
        }
        Ok(obj)
    }

    pub fn api_version(&self) -> &str {
        self.str_at(&["apiVersion"]).unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.str_at(&["kind"]).unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.str_at(&["metadata", "name"]).unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.str_at(&["metadata", "namespace"])
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.api_version(), self.kind(), self.namespace(), self.name())
    }

    pub fn is_cluster_scoped(&self) -> bool {
        is_cluster_scoped(self.kind())
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.str_at(&["metadata", "labels", key])
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.metadata_mut()
            .insert("namespace".to_string(), Value::String(namespace.to_string()));
    }

    pub fn set_label(&mut self, key: &str, value: &str) {
        let labels = self
            .metadata_mut()
            .entry("labels")
            .or_insert_with(|| Value::Object(Map::new()));
        if !labels.is_object() {
            *labels = Value::Object(Map::new());
        }
        if let Value::Object(labels) = labels {
            labels.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    /// Adds `owner` unless an owner with the same uid is already present.
    pub fn add_owner_reference(&mut self, owner: &OwnerReference) {
        let refs = self
            .metadata_mut()
            .entry("ownerReferences")
            .or_insert_with(|| Value::Array(Vec::new()));
        if !refs.is_array() {
            *refs = Value::Array(Vec::new());
        }
        if let Value::Array(refs) = refs {
            let present = refs
                .iter()
                .any(|r| r.get("uid").and_then(Value::as_str) == Some(owner.uid.as_str()));
            if !present {
                if let Ok(value) = serde_json::to_value(owner) {
                    refs.push(value);
                }
            }
        }
    }

    pub fn owner_references(&self) -> Vec<OwnerReference> {
        self.get(&["metadata", "ownerReferences"])
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.0.get(*first)?, |current, segment| current.get(segment))
    }

    pub fn str_at(&self, path: &[&str]) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn i64_at(&self, path: &[&str]) -> Option<i64> {
        self.get(path).and_then(Value::as_i64)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        let metadata = self
            .0
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        match metadata {
            Value::Object(map) => map,
            _ => unreachable!("metadata is a mapping"),
        }
    }
}

impl TryFrom<Value> for ClusterObject {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        ClusterObject::from_value(value)
    }
}

impl From<ClusterObject> for Value {
    fn from(obj: ClusterObject) -> Self {
        obj.into_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment() -> ClusterObject {
        ClusterObject::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": "web", "namespace": "prod" },
            "spec": { "replicas": 3 }
        }))
        .unwrap()
    }

    #[test]
    fn test_from_value_requires_identity() {
        assert!(ClusterObject::from_value(json!({"kind": "Pod"})).is_err());
        assert!(ClusterObject::from_value(json!("text")).is_err());
        let err = ClusterObject::from_value(json!({
            "apiVersion": "v1", "kind": "Pod", "metadata": {}
        }))
        .unwrap_err();
        assert_eq!(err, "missing metadata.name");
    }

    #[test]
    fn test_key_and_accessors() {
        let obj = deployment();
        let key = obj.key();
        assert_eq!(key.group(), "apps");
        assert_eq!(key.version(), "v1");
        assert_eq!(key.namespace.as_deref(), Some("prod"));
        assert_eq!(obj.i64_at(&["spec", "replicas"]), Some(3));
        assert_eq!(key.to_string(), "apps/v1/Deployment prod/web");

        let core = ObjectKey::new("v1", "ConfigMap", None, "cfg");
        assert_eq!(core.group(), "");
        assert_eq!(core.version(), "v1");
    }

    #[test]
    fn test_cluster_scope() {
        assert!(!deployment().is_cluster_scoped());
        assert!(is_cluster_scoped("ClusterRoleBinding"));
        assert!(is_cluster_scoped("ValidatingWebhookConfiguration"));
        assert!(!is_cluster_scoped("Role"));
    }

    #[test]
    fn test_labels_and_owner_references() {
        let mut obj = deployment();
        obj.set_label("app", "web");
        obj.set_label("app", "web2");
        assert_eq!(obj.label("app"), Some("web2"));

        let owner = OwnerReference {
            api_version: "planexec.dev/v1alpha1".into(),
            kind: "Instance".into(),
            name: "demo".into(),
            uid: "uid-1".into(),
            controller: Some(true),
            block_owner_deletion: None,
        };
        obj.add_owner_reference(&owner);
        obj.add_owner_reference(&owner);
        assert_eq!(obj.owner_references(), vec![owner]);
    }
}
