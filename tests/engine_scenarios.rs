use std::collections::HashMap;

use planexec::cluster::memory::MemoryCluster;
use planexec::cluster::PatchStrategy;
use planexec::error::Operation;
use planexec::health::{HealthRegistry, PLAN_EXECUTION_API_VERSION, PLAN_EXECUTION_KIND};
use planexec::log::{Event, RecordingBus};
use planexec::model::*;
use planexec::object::{ClusterObject, ObjectKey};
use planexec::render::Renderer;
use planexec::{execute_plan, ActivePlan, ExecutionContext};
use serde_json::json;

const CHILD_INSTANCE: &str = "apiVersion: planexec.dev/v1alpha1
kind: Instance
metadata:
  name: {{ .Name }}-zookeeper
spec:
  operatorVersion: zookeeper-0.3.0
";

fn parent_plan() -> ActivePlan {
    let spec = Plan {
        phases: vec![Phase {
            name: "dependencies".into(),
            strategy: Strategy::Serial,
            steps: vec![Step {
                name: "zookeeper".into(),
                tasks: vec!["zookeeper".into()],
                delete: false,
            }],
        }],
    };
    ActivePlan {
        name: "deploy".into(),
        status: PlanExecutionStatus::for_plan("deploy", &spec),
        spec,
        tasks: HashMap::from([(
            "zookeeper".to_string(),
            TaskSpec { resources: vec!["zk.yaml".into()] },
        )]),
        templates: HashMap::from([("zk.yaml".to_string(), CHILD_INSTANCE.to_string())]),
        params: Default::default(),
    }
}

fn metadata() -> ExecutionMetadata {
    ExecutionMetadata {
        instance_name: "kafka".into(),
        instance_namespace: "streaming".into(),
        operator_name: "kafka".into(),
        operator_version_name: "kafka-1.2.0".into(),
        operator_version: "1.2.0".into(),
        plan_execution_id: "kafka-deploy-1".into(),
        resources_owner: OwnerReference {
            api_version: "planexec.dev/v1alpha1".into(),
            kind: "Instance".into(),
            name: "kafka".into(),
            uid: "uid-kafka".into(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        },
    }
}

#[tokio::test]
async fn test_child_instance_waits_for_its_plan_and_is_merge_patched() {
    let cluster = MemoryCluster::new();
    let renderer = Renderer::default();
    let health = HealthRegistry::default();
    let bus = RecordingBus::new();
    let ctx = ExecutionContext {
        client: &cluster,
        renderer: &renderer,
        health: &health,
        events: &bus,
    };
    let mut plan = parent_plan();
    let child = ObjectKey::new("planexec.dev/v1alpha1", "Instance", Some("streaming"), "kafka-zookeeper");

    // the child has no active plan yet
    let outcome = execute_plan(&plan, &metadata(), &ctx).await;
    assert!(outcome.error.is_none());
    plan.status = outcome.status;
    assert_eq!(plan.status.phases[0].steps[0].state, ExecutionState::InProgress);
    assert!(cluster.object(&child).is_some());

    cluster
        .set_status(&child, json!({ "activePlan": { "name": "kafka-zookeeper-deploy" } }))
        .unwrap();
    cluster.insert(
        ClusterObject::from_value(json!({
            "apiVersion": PLAN_EXECUTION_API_VERSION,
            "kind": PLAN_EXECUTION_KIND,
            "metadata": { "name": "kafka-zookeeper-deploy", "namespace": "streaming" },
            "status": { "state": "COMPLETE" },
        }))
        .unwrap(),
    );
    cluster.clear_calls();

    let outcome = execute_plan(&plan, &metadata(), &ctx).await;
    assert!(outcome.error.is_none());
    assert_eq!(outcome.status.state, ExecutionState::Complete);

    let patches: Vec<_> = cluster
        .calls()
        .into_iter()
        .filter(|c| c.operation == Operation::Patch)
        .map(|c| c.strategy)
        .collect();
    assert_eq!(
        patches,
        vec![Some(PatchStrategy::StrategicMerge), Some(PatchStrategy::Merge)]
    );
    assert!(bus
        .events()
        .iter()
        .any(|e| matches!(e, Event::PatchFallback { .. })));
}

#[tokio::test]
async fn test_rendered_objects_carry_ownership_and_labels() {
    let cluster = MemoryCluster::new();
    let renderer = Renderer::default();
    let health = HealthRegistry::default();
    let bus = RecordingBus::new();
    let ctx = ExecutionContext {
        client: &cluster,
        renderer: &renderer,
        health: &health,
        events: &bus,
    };

    execute_plan(&parent_plan(), &metadata(), &ctx).await;

    let child = cluster
        .object(&ObjectKey::new("planexec.dev/v1alpha1", "Instance", Some("streaming"), "kafka-zookeeper"))
        .unwrap();
    let owners = child.owner_references();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].uid, "uid-kafka");
    assert_eq!(child.label("planexec.dev/instance"), Some("kafka"));
    assert_eq!(child.label("planexec.dev/step"), Some("zookeeper"));
}
