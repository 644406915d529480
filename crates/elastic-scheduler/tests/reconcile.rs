//! Reconciliation against the in-memory backend: ownership filtering,
//! listing, refresh, and the polling loop.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use elastic_backend::{
    Call, Compatibility, ContainerDefinition, DesiredStatus, EcsApi, NetworkMode, Task,
    TaskDefinition, TaskDefinitionStatus,
};
use elastic_core::{ElasticProfile, LaunchMode, OwnershipLabels};
use elastic_scheduler::{ReconcileLoop, TaskRegistry, TaskTarget, from_task_info};

fn is_describe(c: &Call) -> bool {
    matches!(
        c,
        Call::DescribeTasks { .. } | Call::DescribeTaskDefinition { .. }
    )
}

/// A serverless task and its labelled definition, as another process
/// (spot capacity, another server) would leave them in the cluster.
fn foreign_task(name: &str, server_id: &str, spot: bool) -> (Task, TaskDefinition) {
    let mut profile = ElasticProfile::new("gocd/gocd-agent-alpine", 1024);
    profile.launch_mode = LaunchMode::Serverless;
    profile.run_as_spot_instance = spot;
    let labels = OwnershipLabels {
        server_id: server_id.to_string(),
        job_identifier: job(7),
        environment: "prod".to_string(),
        profile,
    }
    .encode("elastic-agent.ecs")
    .unwrap();

    let definition_arn = format!("arn:aws:ecs:local:000000000000:task-definition/{name}:1");
    let definition = TaskDefinition {
        task_definition_arn: definition_arn.clone(),
        family: name.to_string(),
        revision: 1,
        status: TaskDefinitionStatus::Active,
        container_definitions: vec![ContainerDefinition {
            name: name.to_string(),
            image: "gocd/gocd-agent-alpine".to_string(),
            command: Vec::new(),
            environment: Default::default(),
            docker_labels: labels,
            memory: Some(1024),
            memory_reservation: None,
            cpu: 256,
            privileged: false,
            essential: true,
            mount_points: Vec::new(),
            log_configuration: None,
        }],
        network_mode: NetworkMode::Awsvpc,
        requires_compatibilities: vec![Compatibility::Fargate],
        cpu: Some("256".to_string()),
        memory: Some("1024".to_string()),
    };
    let task = Task {
        task_arn: format!("arn:aws:ecs:local:000000000000:task/agents/{name}-task"),
        task_definition_arn: definition_arn,
        cluster: "agents".to_string(),
        container_instance_arn: None,
        last_status: "RUNNING".to_string(),
        desired_status: DesiredStatus::Running,
        launch_type: None,
        capacity_provider_name: Some(if spot { "FARGATE_SPOT" } else { "FARGATE" }.to_string()),
        created_at: Some(1_700_000_000),
        containers: Vec::new(),
    };
    (task, definition)
}

#[tokio::test]
async fn empty_cluster_lists_without_describing() {
    let h = Harness::new();
    let reconciler = h.reconciler(SERVER_ID);

    let tasks = reconciler.list_all_tasks(&h.settings).await.unwrap();
    assert!(tasks.is_empty());
    assert_eq!(h.ecs.count_calls(is_describe), 0);

    let running = reconciler.all_running_containers(&h.settings).await.unwrap();
    assert!(running.is_empty());
    assert_eq!(h.ecs.count_calls(is_describe), 0);
}

#[tokio::test]
async fn refresh_unknown_task_is_none() {
    let h = Harness::new();
    let reconciler = h.reconciler(SERVER_ID);
    let refreshed = reconciler
        .refresh_task(&h.settings, "arn:aws:ecs:local:000000000000:task/agents/nope")
        .await
        .unwrap();
    assert!(refreshed.is_none());
}

#[tokio::test]
async fn refresh_known_task() {
    let h = Harness::new();
    let task = h
        .orchestrator
        .create(&instance_request(false), &h.settings, &h.console)
        .await
        .unwrap()
        .unwrap();

    let refreshed = h
        .reconciler(SERVER_ID)
        .refresh_task(&h.settings, &task.task_arn)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.task_arn, task.task_arn);
}

#[tokio::test]
async fn ownership_filter_on_rebuilt_tasks() {
    let h = Harness::new();
    h.orchestrator
        .create(&instance_request(false), &h.settings, &h.console)
        .await
        .unwrap();

    let reconciler = h.reconciler(SERVER_ID);
    let tasks = reconciler.list_all_tasks(&h.settings).await.unwrap();
    let instances = reconciler.container_instance_map(&h.settings).await.unwrap();
    assert_eq!(tasks.len(), 1);
    let (task, definition) = &tasks[0];

    assert!(
        from_task_info(task, definition, &instances, "server-B")
            .unwrap()
            .is_none()
    );
    let rebuilt = from_task_info(task, definition, &instances, "SERVER-a")
        .unwrap()
        .unwrap();
    assert!(matches!(rebuilt.target, TaskTarget::Real { .. }));
    assert_eq!(rebuilt.environment, "prod");
}

#[tokio::test]
async fn running_containers_exclude_stopped_tasks() {
    let h = Harness::new();
    let keep = h
        .orchestrator
        .create(&instance_request(false), &h.settings, &h.console)
        .await
        .unwrap()
        .unwrap();
    let stop = h
        .orchestrator
        .create(&serverless_request(false), &h.settings, &h.console)
        .await
        .unwrap()
        .unwrap();
    h.orchestrator.stop_and_cleanup_task(&h.settings, &stop).await;

    let running = h
        .reconciler(SERVER_ID)
        .all_running_containers(&h.settings)
        .await
        .unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].task_arn, keep.task_arn);
    assert_eq!(running[0].container_name, keep.name);
    assert_eq!(running[0].image.as_deref(), Some("gocd/gocd-agent-alpine"));
    let labels = running[0].labels.as_ref().unwrap();
    assert_eq!(labels.server_id, SERVER_ID);
}

#[tokio::test]
async fn refresh_all_replaces_registry_contents() {
    let h = Harness::new();
    let task = h
        .orchestrator
        .create(&serverless_request(true), &h.settings, &h.console)
        .await
        .unwrap()
        .unwrap();

    let registry = TaskRegistry::new();
    registry.insert(task.clone()).await;

    let reconcile = ReconcileLoop::new(
        Arc::new(h.reconciler("server-a")),
        registry.clone(),
        Arc::new(h.settings.clone()),
    );
    assert_eq!(reconcile.refresh_all().await.unwrap(), 1);

    let rebuilt = registry.get(&task.name).await.unwrap();
    assert_eq!(rebuilt.task_arn, task.task_arn);
    // The placeholder handed out at creation survives reconciliation.
    assert_eq!(rebuilt.target, task.target);

    // Another server sees nothing of ours.
    let foreign = TaskRegistry::new();
    let other = ReconcileLoop::new(
        Arc::new(h.reconciler("server-B")),
        foreign.clone(),
        Arc::new(h.settings.clone()),
    );
    assert_eq!(other.refresh_all().await.unwrap(), 0);
    assert!(foreign.is_empty().await);
}

#[tokio::test]
async fn reconcile_loop_runs_until_shutdown() {
    let h = Harness::new();
    h.orchestrator
        .create(&instance_request(false), &h.settings, &h.console)
        .await
        .unwrap();

    let registry = TaskRegistry::new();
    let reconcile = Arc::new(ReconcileLoop::new(
        Arc::new(h.reconciler(SERVER_ID)),
        registry.clone(),
        Arc::new(h.settings.clone()),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = {
        let reconcile = reconcile.clone();
        tokio::spawn(async move {
            reconcile
                .run(Duration::from_millis(10), shutdown_rx)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop stops on shutdown")
        .unwrap();

    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn stopped_task_does_not_break_listing() {
    let h = Harness::new();
    let keep = h
        .orchestrator
        .create(&instance_request(false), &h.settings, &h.console)
        .await
        .unwrap()
        .unwrap();
    let stop = h
        .orchestrator
        .create(&instance_request(false), &h.settings, &h.console)
        .await
        .unwrap()
        .unwrap();
    h.orchestrator.stop_and_cleanup_task(&h.settings, &stop).await;
    h.ecs.clear_calls();

    let reconciler = h.reconciler(SERVER_ID);
    let tasks = reconciler.list_all_tasks(&h.settings).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].0.task_arn, keep.task_arn);
    // Only the live task's definition is described.
    assert_eq!(
        h.ecs
            .count_calls(|c| matches!(c, Call::DescribeTaskDefinition { .. })),
        1
    );

    let registry = TaskRegistry::new();
    let reconcile = ReconcileLoop::new(
        Arc::new(reconciler),
        registry.clone(),
        Arc::new(h.settings.clone()),
    );
    assert_eq!(reconcile.refresh_all().await.unwrap(), 1);
    assert!(registry.get(&keep.name).await.is_some());
    assert!(registry.get(&stop.name).await.is_none());
}

#[tokio::test]
async fn running_task_with_deleted_definition_is_skipped() {
    let h = Harness::new();
    let (orphan, definition) = foreign_task("GoCDorphan", SERVER_ID, false);
    h.ecs.insert_task(orphan, definition.clone());
    let (live, live_definition) = foreign_task("GoCDlive", SERVER_ID, false);
    h.ecs.insert_task(live.clone(), live_definition);

    h.ecs
        .deregister_task_definition(&definition.task_definition_arn)
        .await
        .unwrap();
    h.ecs
        .delete_task_definitions(&[definition.task_definition_arn.clone()])
        .await
        .unwrap();

    let tasks = h
        .reconciler(SERVER_ID)
        .list_all_tasks(&h.settings)
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].0.task_arn, live.task_arn);
}

#[tokio::test]
async fn out_of_band_tasks_are_found_by_owner() {
    let h = Harness::new();
    // Spot capacity started this one after create() handed it off.
    let (spot, spot_definition) = foreign_task("GoCDspot", SERVER_ID, true);
    h.ecs.insert_task(spot.clone(), spot_definition);
    let (other, other_definition) = foreign_task("GoCDother", "server-B", false);
    h.ecs.insert_task(other.clone(), other_definition);

    let listed = h
        .reconciler(SERVER_ID)
        .list_all_tasks(&h.settings)
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);

    let registry = TaskRegistry::new();
    let reconcile = ReconcileLoop::new(
        Arc::new(h.reconciler(SERVER_ID)),
        registry.clone(),
        Arc::new(h.settings.clone()),
    );
    assert_eq!(reconcile.refresh_all().await.unwrap(), 1);

    let found = registry.get("GoCDspot").await.unwrap();
    assert_eq!(found.task_arn, spot.task_arn);
    assert_eq!(found.job_identifier, job(7));
    assert!(matches!(found.target, TaskTarget::Synthetic { spot: true, .. }));
    assert_eq!(found.target.display_id(), Some("FargateSpotGoCDspot-task"));
    assert!(registry.get("GoCDother").await.is_none());

    // The other server sees only its own task.
    let theirs = TaskRegistry::new();
    let other_loop = ReconcileLoop::new(
        Arc::new(h.reconciler("server-b")),
        theirs.clone(),
        Arc::new(h.settings.clone()),
    );
    assert_eq!(other_loop.refresh_all().await.unwrap(), 1);
    assert_eq!(theirs.get("GoCDother").await.unwrap().task_arn, other.task_arn);
}

#[tokio::test]
async fn configured_loop_uses_settings_interval() {
    let mut h = Harness::new();
    h.settings.reconcile_interval_secs = 1;
    h.orchestrator
        .create(&instance_request(false), &h.settings, &h.console)
        .await
        .unwrap();

    let registry = TaskRegistry::new();
    let reconcile = Arc::new(ReconcileLoop::new(
        Arc::new(h.reconciler(SERVER_ID)),
        registry.clone(),
        Arc::new(h.settings.clone()),
    ));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = {
        let reconcile = reconcile.clone();
        tokio::spawn(async move { reconcile.run_configured(shutdown_rx).await })
    };

    // Nothing before the first tick, one pass after it.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(registry.is_empty().await);
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(registry.len().await, 1);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop stops on shutdown")
        .unwrap();
}
