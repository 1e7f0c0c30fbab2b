use std::sync::Arc;

use planexec::cluster::memory::MemoryCluster;
use planexec::controller::Controller;
use planexec::model::{ExecutionState, Instance};
use planexec::operator::load_operator_dir;
use planexec::state::tracker::{load_state_from, save_state_to, PersistedInstance};
use tempfile::TempDir;

fn write_operator(dir: &std::path::Path) {
    std::fs::create_dir_all(dir.join("templates")).unwrap();
    std::fs::write(
        dir.join("operator.yaml"),
        "name: queue\nversion: 2.1.0\ntasks:\n  broker:\n    resources: [broker.yaml]\nplans:\n  deploy:\n    phases:\n      - name: main\n        steps:\n          - name: broker\n            tasks: [broker]\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("templates").join("broker.yaml"),
        "apiVersion: apps/v1\nkind: StatefulSet\nmetadata:\n  name: {{ .Name }}-broker\nspec:\n  replicas: 3\n",
    )
    .unwrap();
}

async fn controller(operator_dir: &std::path::Path) -> Controller {
    let controller = Controller::new(Arc::new(MemoryCluster::new()));
    controller.add_operator(load_operator_dir(operator_dir).unwrap()).await;
    controller
}

#[tokio::test]
async fn test_state_file_round_trip_resumes_progress() {
    let tmp = TempDir::new().unwrap();
    let operator_dir = tmp.path().join("operators").join("queue");
    write_operator(&operator_dir);
    let state_path = tmp.path().join("state").join("state.json");

    let before = controller(&operator_dir).await;
    before
        .register(Instance {
            name: "events".into(),
            namespace: "infra".into(),
            operator_version: "queue-2.1.0".into(),
            plan: "deploy".into(),
            params: Default::default(),
            uid: None,
        })
        .await
        .unwrap();
    before.tick("infra", "events").await.unwrap();
    let saved = before.snapshot().await;
    save_state_to(&state_path, &saved).unwrap();

    let loaded: Vec<PersistedInstance> = load_state_from(&state_path).unwrap();
    let after = controller(&operator_dir).await;
    assert_eq!(after.restore(loaded).await, 1);

    let record = after.status("infra", "events").await.unwrap();
    assert_eq!(record.status, saved[0].status);
    assert_eq!(record.status.phases[0].steps[0].state, ExecutionState::InProgress);
    assert_eq!(record.instance.uid, saved[0].instance.uid);
}

#[tokio::test]
async fn test_restore_skips_instances_of_unknown_operators() {
    let tmp = TempDir::new().unwrap();
    let operator_dir = tmp.path().join("queue");
    write_operator(&operator_dir);

    let source = controller(&operator_dir).await;
    source
        .register(Instance {
            name: "events".into(),
            namespace: "infra".into(),
            operator_version: "queue-2.1.0".into(),
            plan: "deploy".into(),
            params: Default::default(),
            uid: None,
        })
        .await
        .unwrap();
    let mut saved = source.snapshot().await;
    saved[0].instance.operator_version = "queue-3.0.0".into();

    let target = controller(&operator_dir).await;
    assert_eq!(target.restore(saved).await, 0);
    assert!(target.list().await.is_empty());
}
