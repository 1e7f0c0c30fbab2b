use serde::Deserialize;
use serde_json::Value;

use crate::error::ConventionError;
use crate::model::OwnerReference;
use crate::object::ClusterObject;

pub const INSTANCE_LABEL: &str = "planexec.dev/instance";
pub const OPERATOR_LABEL: &str = "planexec.dev/operator";
pub const OPERATOR_VERSION_LABEL: &str = "planexec.dev/operator-version";
pub const PLAN_LABEL: &str = "planexec.dev/plan";
pub const PHASE_LABEL: &str = "planexec.dev/phase";
pub const STEP_LABEL: &str = "planexec.dev/step";
pub const PLAN_EXECUTION_LABEL: &str = "planexec.dev/plan-execution-id";

/// Values stamped as labels on every object of a step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConventionMetadata {
    pub instance_name: String,
    pub namespace: String,
    pub operator_name: String,
    pub operator_version: String,
    pub plan_execution_id: String,
    pub plan_name: String,
    pub phase_name: String,
    pub step_name: String,
}

impl ConventionMetadata {
    pub fn labels(&self) -> [(&'static str, &str); 7] {
        [
            (INSTANCE_LABEL, self.instance_name.as_str()),
            (OPERATOR_LABEL, self.operator_name.as_str()),
            (OPERATOR_VERSION_LABEL, self.operator_version.as_str()),
            (PLAN_LABEL, self.plan_name.as_str()),
            (PHASE_LABEL, self.phase_name.as_str()),
            (STEP_LABEL, self.step_name.as_str()),
            (PLAN_EXECUTION_LABEL, self.plan_execution_id.as_str()),
        ]
    }
}

/// Turns rendered manifests into owned, labelled cluster objects.
pub trait ObjectEnhancer: Send + Sync {
    /// `templates` are `(template name, rendered text)` pairs in declaration order.
    fn apply_conventions(
        &self,
        templates: &[(String, String)],
        metadata: &ConventionMetadata,
        owner: &OwnerReference,
    ) -> Result<Vec<ClusterObject>, ConventionError>;
}

/// Parses multi-document YAML, defaults the namespace, stamps owner and labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct Conventions;

impl ObjectEnhancer for Conventions {
    fn apply_conventions(
        &self,
        templates: &[(String, String)],
        metadata: &ConventionMetadata,
        owner: &OwnerReference,
    ) -> Result<Vec<ClusterObject>, ConventionError> {
        let mut objects = Vec::new();
        for (template, text) in templates {
            for document in serde_yaml::Deserializer::from_str(text) {
                let value = Value::deserialize(document).map_err(|source| ConventionError::Yaml {
                    template: template.clone(),
                    source,
                })?;
                if value.is_null() {
                    continue;
                }
                let mut object = ClusterObject::from_value(value).map_err(|reason| {
                    ConventionError::InvalidObject {
                        template: template.clone(),
                        reason,
                    }
                })?;
                if object.namespace().is_none() && !object.is_cluster_scoped() {
                    object.set_namespace(&metadata.namespace);
                }
                for (key, value) in metadata.labels() {
                    object.set_label(key, value);
                }
                object.add_owner_reference(owner);
                objects.push(object);
            }
        }
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ConventionMetadata {
        ConventionMetadata {
            instance_name: "zk".into(),
            namespace: "data".into(),
            operator_name: "zookeeper".into(),
            operator_version: "0.1.0".into(),
            plan_execution_id: "exec-1".into(),
            plan_name: "deploy".into(),
            phase_name: "main".into(),
            step_name: "everything".into(),
        }
    }

    fn owner() -> OwnerReference {
        OwnerReference {
            api_version: "planexec.dev/v1alpha1".into(),
            kind: "Instance".into(),
            name: "zk".into(),
            uid: "uid-zk".into(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    #[test]
    fn test_multi_document_template_is_stamped() {
        let text = "apiVersion: v1\nkind: Service\nmetadata:\n  name: zk-hs\n---\napiVersion: apps/v1\nkind: StatefulSet\nmetadata:\n  name: zk\n  namespace: other\n  labels:\n    app: zk\n";
        let objects = Conventions
            .apply_conventions(&[("zk.yaml".into(), text.into())], &metadata(), &owner())
            .unwrap();

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].namespace(), Some("data"));
        assert_eq!(objects[1].namespace(), Some("other"));
        assert_eq!(objects[1].label("app"), Some("zk"));
        for object in &objects {
            assert_eq!(object.label(INSTANCE_LABEL), Some("zk"));
            assert_eq!(object.label(STEP_LABEL), Some("everything"));
            assert_eq!(object.label(PLAN_EXECUTION_LABEL), Some("exec-1"));
            assert_eq!(object.owner_references(), vec![owner()]);
        }
    }

    #[test]
    fn test_cluster_scoped_kinds_keep_no_namespace() {
        let text = "apiVersion: rbac.authorization.k8s.io/v1\nkind: ClusterRole\nmetadata:\n  name: zk-reader\n---\napiVersion: v1\nkind: Namespace\nmetadata:\n  name: zk-system\n---\napiVersion: apiextensions.k8s.io/v1\nkind: CustomResourceDefinition\nmetadata:\n  name: znodes.zk.dev\n---\napiVersion: v1\nkind: ServiceAccount\nmetadata:\n  name: zk\n";
        let objects = Conventions
            .apply_conventions(&[("rbac.yaml".into(), text.into())], &metadata(), &owner())
            .unwrap();

        assert_eq!(objects.len(), 4);
        for object in &objects[..3] {
            assert_eq!(object.namespace(), None, "{} should stay cluster-scoped", object.kind());
            assert_eq!(object.label(INSTANCE_LABEL), Some("zk"));
        }
        assert_eq!(objects[3].namespace(), Some("data"));
        assert_eq!(
            crate::cluster::http::object_url("https://k8s", &objects[0].key()),
            "https://k8s/apis/rbac.authorization.k8s.io/v1/clusterroles/zk-reader"
        );
        assert_eq!(
            crate::cluster::http::object_url("https://k8s", &objects[1].key()),
            "https://k8s/api/v1/namespaces/zk-system"
        );
    }

    #[test]
    fn test_empty_documents_are_skipped() {
        let text = "---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n---\n~\n";
        let objects = Conventions
            .apply_conventions(&[("cfg.yaml".into(), text.into())], &metadata(), &owner())
            .unwrap();
        assert_eq!(objects.len(), 1);
    }

    #[test]
    fn test_invalid_documents_are_rejected() {
        let not_yaml = Conventions.apply_conventions(
            &[("bad.yaml".into(), "kind: [unclosed".into())],
            &metadata(),
            &owner(),
        );
        assert!(matches!(not_yaml, Err(ConventionError::Yaml { .. })));

        let no_name = Conventions.apply_conventions(
            &[("anon.yaml".into(), "apiVersion: v1\nkind: ConfigMap\n".into())],
            &metadata(),
            &owner(),
        );
        match no_name {
            Err(ConventionError::InvalidObject { template, .. }) => assert_eq!(template, "anon.yaml"),
            other => panic!("expected InvalidObject, got {:?}", other),
        }
    }
}
