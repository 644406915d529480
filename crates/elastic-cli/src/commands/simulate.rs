use std::path::Path;
use std::sync::Arc;

use elastic_backend::{Failure, MemoryEcs};
use elastic_core::{NullConsole, PluginSettings, ScheduleRequest};
use elastic_placement::{InstanceInventory, LoggingSpotCapacity, MemoryInventory, StrategySelector};
use elastic_scheduler::{
    ReconcileLoop, Reconciler, ScheduledTask, TaskOrchestrator, TaskRegistry,
};
use tracing::info;

use super::StdoutConsole;

pub struct SimulateOptions {
    pub server_id: String,
    pub fail_launch: bool,
    pub reject_capacity: bool,
}

/// What a simulation run did, step by step.
#[derive(Debug, Default)]
pub struct SimulationReport {
    pub scheduled: Option<ScheduledTask>,
    pub error: Option<String>,
    pub reconciled: usize,
    pub definitions_left: usize,
}

pub async fn simulate(
    settings: &Path,
    request: &Path,
    options: SimulateOptions,
) -> anyhow::Result<()> {
    let settings = super::load_settings(settings)?;
    let request = super::load_request(request)?;
    let report = run(&settings, &request, &options).await?;

    if let Some(error) = &report.error {
        println!("✗ create failed: {error}");
    }
    println!("reconciled tasks:   {}", report.reconciled);
    println!("definitions left:   {}", report.definitions_left);
    Ok(())
}

/// Create → reconcile → stop against a fresh in-memory backend holding one
/// container instance for the request's platform.
pub async fn run(
    settings: &PluginSettings,
    request: &ScheduleRequest,
    options: &SimulateOptions,
) -> anyhow::Result<SimulationReport> {
    let ecs = MemoryEcs::new();
    if options.reject_capacity {
        ecs.disable_capacity_providers();
    }
    if options.fail_launch {
        ecs.fail_launches(vec![Failure {
            arn: None,
            reason: "simulated launch failure".to_string(),
        }]);
    }

    let inventory = MemoryInventory::new(ecs.clone());
    if !request.profile.is_serverless() {
        inventory
            .provision(settings, &request.profile, &NullConsole)
            .await?;
    }

    let selector = StrategySelector::new(Arc::new(ecs.clone()), Arc::new(inventory));
    let orchestrator = TaskOrchestrator::new(
        Arc::new(ecs.clone()),
        Arc::new(selector),
        Arc::new(LoggingSpotCapacity),
        options.server_id.clone(),
    );
    let mut report = SimulationReport::default();

    println!("→ create {}", request.job_identifier.represent());
    match orchestrator.create(request, settings, &StdoutConsole).await {
        Ok(Some(task)) => {
            println!(
                "✓ scheduled {} on {}",
                task.name,
                task.target.display_id().unwrap_or("unknown instance")
            );
            report.scheduled = Some(task);
        }
        Ok(None) => println!("✓ handed off to spot capacity"),
        Err(e) => report.error = Some(e.to_string()),
    }

    println!("→ reconcile");
    let registry = TaskRegistry::new();
    let reconcile = ReconcileLoop::new(
        Arc::new(Reconciler::new(Arc::new(ecs.clone()), options.server_id.clone())),
        registry.clone(),
        Arc::new(settings.clone()),
    );
    report.reconciled = reconcile.refresh_all().await?;
    for task in registry.list().await {
        println!("  {} {} ({})", task.name, task.task_arn, task.last_status);
    }

    if let Some(task) = &report.scheduled {
        println!("→ stop {}", task.name);
        orchestrator.stop_and_cleanup_task(settings, task).await;
    }
    report.definitions_left = ecs.definitions().len();
    info!(
        scheduled = report.scheduled.is_some(),
        reconciled = report.reconciled,
        definitions_left = report.definitions_left,
        "simulation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use elastic_core::{ElasticProfile, JobIdentifier, LaunchMode};
    use elastic_scheduler::TaskTarget;

    fn request(serverless: bool) -> ScheduleRequest {
        let mut profile = ElasticProfile::new("gocd/agent", 512);
        if serverless {
            profile.launch_mode = LaunchMode::Serverless;
        }
        ScheduleRequest {
            job_identifier: JobIdentifier {
                pipeline_name: "build".to_string(),
                pipeline_counter: 1,
                pipeline_label: "1".to_string(),
                stage_name: "s".to_string(),
                stage_counter: "1".to_string(),
                job_name: "j".to_string(),
                job_id: 1,
            },
            environment: String::new(),
            profile,
            auto_register_key: String::new(),
        }
    }

    fn options(fail_launch: bool, reject_capacity: bool) -> SimulateOptions {
        SimulateOptions {
            server_id: "sim".to_string(),
            fail_launch,
            reject_capacity,
        }
    }

    fn settings() -> PluginSettings {
        let mut settings = PluginSettings::new("https://ci", "agents");
        settings.subnet_ids = vec!["subnet-1".to_string()];
        settings
    }

    #[tokio::test]
    async fn instance_backed_round_trip() {
        let report = run(&settings(), &request(false), &options(false, false))
            .await
            .unwrap();
        let task = report.scheduled.unwrap();
        assert!(matches!(task.target, TaskTarget::Real { .. }));
        assert_eq!(report.reconciled, 1);
        assert_eq!(report.definitions_left, 0);
    }

    #[tokio::test]
    async fn serverless_fallback_round_trip() {
        let report = run(&settings(), &request(true), &options(false, true))
            .await
            .unwrap();
        assert!(report.scheduled.unwrap().target.is_synthetic());
        assert_eq!(report.definitions_left, 0);
    }

    #[tokio::test]
    async fn failed_launch_leaves_nothing() {
        let report = run(&settings(), &request(false), &options(true, false))
            .await
            .unwrap();
        assert!(report.scheduled.is_none());
        assert!(report.error.unwrap().starts_with("Fail to start task"));
        assert_eq!(report.reconciled, 0);
        assert_eq!(report.definitions_left, 0);
    }
}
