//! Launch orchestration.
//!
//! `create` takes one request to a single outcome:
//!
//! ```text
//! Building ─► TargetResolution ─► DefinitionRegistered ─► Launching ─┬─► Scheduled
//!                                                                    └─► RolledBack
//! ```
//!
//! Both launch modes share the register → launch → interpret → rollback
//! skeleton; they differ only in the [`LaunchPlan`] handed to it. A
//! definition registered by a failed attempt is deregistered and deleted
//! before the error is returned.

use std::sync::Arc;

use elastic_backend::{
    AwsVpcConfiguration, BackendResult, CapacityProviderStrategyItem, EcsApi, LaunchOutcome,
    LaunchType, NetworkConfiguration, RunTask, StartTask,
};
use elastic_core::{ConsoleLog, ElasticProfile, OwnershipLabels, PluginSettings, ScheduleRequest};
use elastic_placement::{BackingTarget, InstanceSelector, SpotCapacity};
use tracing::{debug, info, warn};

use crate::error::{SchedulerError, SchedulerResult};
use crate::registry::{DefinitionRegistry, RegisteredDefinition};
use crate::task::{ScheduledTask, TaskTarget};
use crate::task_spec::{SpecError, TaskSpecification};

pub const FARGATE: &str = "FARGATE";
pub const FARGATE_SPOT: &str = "FARGATE_SPOT";

const STOP_REASON: &str = "Stopped by elastic agent server.";

/// Progress of one `create` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    Building,
    TargetResolution,
    DefinitionRegistered,
    Launching,
    Scheduled,
    RolledBack,
}

/// How a registered definition gets launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchPlan {
    /// `start_task` on a chosen container instance.
    InstanceBacked { target: BackingTarget },
    /// `run_task` on backend capacity, first with a capacity provider
    /// strategy and, if that is rejected, once with the plain launch type.
    Serverless {
        network: NetworkConfiguration,
        capacity: CapacityProviderStrategyItem,
    },
}

impl LaunchPlan {
    /// Serverless plan for a profile. Subnets and security groups come from
    /// the profile when set there, else from the settings.
    pub fn serverless(
        task_name: &str,
        settings: &PluginSettings,
        profile: &ElasticProfile,
    ) -> SchedulerResult<Self> {
        let subnets = if profile.subnet_ids.is_empty() {
            settings.subnet_ids.clone()
        } else {
            profile.subnet_ids.clone()
        };
        if subnets.is_empty() {
            return Err(SpecError::NoSubnets(task_name.to_string()).into());
        }
        let security_groups = if profile.security_group_ids.is_empty() {
            settings.security_group_ids.clone()
        } else {
            profile.security_group_ids.clone()
        };
        let provider = if profile.run_as_spot_instance {
            FARGATE_SPOT
        } else {
            FARGATE
        };

        Ok(LaunchPlan::Serverless {
            network: NetworkConfiguration {
                awsvpc_configuration: AwsVpcConfiguration {
                    subnets,
                    security_groups,
                    assign_public_ip: false,
                },
            },
            capacity: CapacityProviderStrategyItem::new(provider),
        })
    }

    fn task_target(&self, profile: &ElasticProfile) -> TaskTarget {
        match self {
            LaunchPlan::InstanceBacked { target } => TaskTarget::Real {
                ec2_instance_id: target.ec2_instance_id.clone(),
            },
            LaunchPlan::Serverless { .. } => TaskTarget::synthetic(profile.run_as_spot_instance),
        }
    }
}

/// Creates and stops agent tasks. Shareable behind `Arc`; holds no
/// per-request state.
pub struct TaskOrchestrator {
    ecs: Arc<dyn EcsApi>,
    selector: Arc<dyn InstanceSelector>,
    spot: Arc<dyn SpotCapacity>,
    registry: DefinitionRegistry,
    server_id: String,
}

impl TaskOrchestrator {
    pub fn new(
        ecs: Arc<dyn EcsApi>,
        selector: Arc<dyn InstanceSelector>,
        spot: Arc<dyn SpotCapacity>,
        server_id: impl Into<String>,
    ) -> Self {
        Self {
            registry: DefinitionRegistry::new(ecs.clone()),
            ecs,
            selector,
            spot,
            server_id: server_id.into(),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Provision one agent task.
    ///
    /// Returns `Ok(None)` when the request was handed to spot capacity;
    /// the task then shows up through reconciliation, if at all.
    pub async fn create(
        &self,
        request: &ScheduleRequest,
        settings: &PluginSettings,
        console: &dyn ConsoleLog,
    ) -> SchedulerResult<Option<ScheduledTask>> {
        let profile = &request.profile;
        transition(None, LaunchState::Building);
        let spec = TaskSpecification::build(request, settings, &self.server_id)?;
        let name = spec.name.as_str();

        let plan = if profile.is_serverless() {
            console.append("This is a serverless task request. Not creating a container instance.");
            info!(task = %name, "serverless task request");
            LaunchPlan::serverless(name, settings, profile)?
        } else {
            transition(Some(name), LaunchState::TargetResolution);
            match self.resolve_target(&spec, settings, profile, console).await? {
                Some(target) => LaunchPlan::InstanceBacked { target },
                None => return Ok(None),
            }
        };

        self.launch(&spec, plan, request, settings, console)
            .await
            .map(Some)
    }

    /// Find a running instance, else hand off to spot or create one.
    async fn resolve_target(
        &self,
        spec: &TaskSpecification,
        settings: &PluginSettings,
        profile: &ElasticProfile,
        console: &dyn ConsoleLog,
    ) -> SchedulerResult<Option<BackingTarget>> {
        let found = self
            .selector
            .instance_for_scheduling(settings, profile, &spec.container)
            .await
            .map_err(SchedulerError::InstanceProvisioning)?;

        if let Some(target) = found {
            console.append(
                "Found an existing container instance matching the task's platform. Not starting a new instance...",
            );
            return Ok(Some(target));
        }

        console.append("No running instance found to run the task for the current job.");
        info!(
            task = %spec.name,
            platform = profile.platform.label(),
            spot = profile.run_as_spot_instance,
            "no running instance found"
        );

        if profile.run_as_spot_instance {
            self.spot.request(settings, profile, console).await;
            return Ok(None);
        }

        let target = self
            .selector
            .create_instance(settings, profile, console)
            .await
            .map_err(SchedulerError::InstanceProvisioning)?;
        Ok(Some(target))
    }

    /// The shared register → launch → interpret → rollback skeleton.
    async fn launch(
        &self,
        spec: &TaskSpecification,
        plan: LaunchPlan,
        request: &ScheduleRequest,
        settings: &PluginSettings,
        console: &dyn ConsoleLog,
    ) -> SchedulerResult<ScheduledTask> {
        let name = spec.name.as_str();
        let profile = &request.profile;

        console.append("Registering task definition with cluster...");
        let registered = self.registry.register(spec).await?;
        console.append("Done registering task definition with cluster.");
        transition(Some(name), LaunchState::DefinitionRegistered);

        transition(Some(name), LaunchState::Launching);
        let outcome = match self.dispatch(&plan, &registered, settings, console).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(task = %name, error = %e, "launch call failed, rolling back");
                self.rollback(name, &registered).await;
                return Err(SchedulerError::Backend(e));
            }
        };

        let started = outcome.is_started();
        let LaunchOutcome { tasks, failures } = outcome;
        let task = match tasks.into_iter().next() {
            Some(task) if started => task,
            _ => {
                self.rollback(name, &registered).await;
                return Err(SchedulerError::Launch {
                    task_name: name.to_string(),
                    failures,
                });
            }
        };

        let target = plan.task_target(profile);
        match &target {
            TaskTarget::Real { ec2_instance_id } if profile.run_as_spot_instance => {
                console.append(
                    "[WARNING] The task is scheduled on a spot instance. A spot instance termination would re-schedule the job.",
                );
                info!(task = %name, %ec2_instance_id, "task scheduled on spot instance");
            }
            TaskTarget::Real { ec2_instance_id } => {
                console.append(&format!(
                    "Task {name} scheduled on container instance {ec2_instance_id}."
                ));
                info!(task = %name, %ec2_instance_id, "task scheduled");
            }
            _ => {
                console.append(&format!("Task {name} scheduled on serverless capacity."));
                info!(task = %name, "task scheduled on serverless capacity");
            }
        }
        transition(Some(name), LaunchState::Scheduled);

        let labels = OwnershipLabels {
            server_id: self.server_id.clone(),
            job_identifier: request.job_identifier.clone(),
            environment: request.environment.clone(),
            profile: profile.clone(),
        };
        Ok(ScheduledTask::new(
            &task,
            &registered.definition,
            labels,
            target,
        ))
    }

    async fn dispatch(
        &self,
        plan: &LaunchPlan,
        registered: &RegisteredDefinition,
        settings: &PluginSettings,
        console: &dyn ConsoleLog,
    ) -> BackendResult<LaunchOutcome> {
        match plan {
            LaunchPlan::InstanceBacked { target } => {
                console.append("Starting task to perform the current job...");
                let request = StartTask {
                    cluster: settings.cluster_name.clone(),
                    task_definition: registered.arn.clone(),
                    container_instances: vec![target.container_instance_arn.clone()],
                    started_by: Some(settings.plugin_id.clone()),
                };
                debug!(?request, "starting task");
                self.ecs.start_task(request).await
            }
            LaunchPlan::Serverless { network, capacity } => {
                console.append(&format!(
                    "Starting {} task to perform the current job...",
                    capacity.capacity_provider
                ));
                let request = RunTask {
                    cluster: settings.cluster_name.clone(),
                    task_definition: registered.arn.clone(),
                    capacity_provider_strategy: vec![capacity.clone()],
                    launch_type: None,
                    network_configuration: Some(network.clone()),
                    started_by: Some(settings.plugin_id.clone()),
                };
                debug!(?request, "running task with capacity provider strategy");
                match self.ecs.run_task(request.clone()).await {
                    Err(e) if e.is_invalid_parameter() => {
                        info!(
                            family = %registered.family,
                            error = %e,
                            "capacity provider strategy rejected, falling back to launch type"
                        );
                        let fallback = RunTask {
                            capacity_provider_strategy: Vec::new(),
                            launch_type: Some(LaunchType::Fargate),
                            ..request
                        };
                        self.ecs.run_task(fallback).await
                    }
                    other => other,
                }
            }
        }
    }

    async fn rollback(&self, name: &str, registered: &RegisteredDefinition) {
        self.registry.cleanup(&registered.arn).await;
        transition(Some(name), LaunchState::RolledBack);
    }

    /// Stop a task and remove its definition. Best-effort: sub-step
    /// failures are logged and the remaining steps still run.
    pub async fn stop_and_cleanup_task(&self, settings: &PluginSettings, task: &ScheduledTask) {
        info!(task = %task.name, arn = %task.task_arn, "stopping task");
        if let Err(e) = self
            .ecs
            .stop_task(&settings.cluster_name, &task.task_arn, STOP_REASON)
            .await
        {
            warn!(task = %task.name, error = %e, "failed to stop task");
        }
        self.registry.cleanup(&task.task_definition_arn).await;
    }
}

fn transition(task: Option<&str>, state: LaunchState) {
    debug!(task = task.unwrap_or("-"), ?state, "launch state");
}
