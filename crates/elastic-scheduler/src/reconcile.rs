//! Reconciliation reader.
//!
//! The backend is the system of record. These reads rebuild the server's
//! view of its agent tasks from task listings and the ownership labels on
//! each task's definition.

use std::collections::HashMap;
use std::sync::Arc;

use elastic_backend::{
    BackendError, DesiredStatus, EcsApi, LaunchType, ListTasks, Task, TaskDefinition,
};
use elastic_core::{OwnershipLabels, PluginSettings, labels};
use tracing::{debug, warn};

use crate::error::SchedulerResult;
use crate::task::{RunningContainer, ScheduledTask, TaskTarget};

/// Reads tasks, definitions and container instances from the backend.
pub struct Reconciler {
    ecs: Arc<dyn EcsApi>,
    server_id: String,
}

impl Reconciler {
    pub fn new(ecs: Arc<dyn EcsApi>, server_id: impl Into<String>) -> Self {
        Self {
            ecs,
            server_id: server_id.into(),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Every task the backend lists by default (desired RUNNING) with its
    /// definition, in listing order.
    pub async fn list_all_tasks(
        &self,
        settings: &PluginSettings,
    ) -> SchedulerResult<Vec<(Task, TaskDefinition)>> {
        self.tasks_with_definitions(settings, None).await
    }

    /// Containers of tasks whose desired status is RUNNING.
    pub async fn all_running_containers(
        &self,
        settings: &PluginSettings,
    ) -> SchedulerResult<Vec<RunningContainer>> {
        let tasks = self
            .tasks_with_definitions(settings, Some(DesiredStatus::Running))
            .await?;
        Ok(tasks
            .iter()
            .map(|(task, definition)| RunningContainer::new(task, definition, &self.server_id))
            .collect())
    }

    /// Current state of one task, or `None` if the backend doesn't know it.
    pub async fn refresh_task(
        &self,
        settings: &PluginSettings,
        task_arn: &str,
    ) -> SchedulerResult<Option<Task>> {
        let tasks = self
            .ecs
            .describe_tasks(&settings.cluster_name, &[task_arn.to_string()])
            .await?;
        Ok(tasks.into_iter().next())
    }

    /// Container instance ARN → EC2 instance id for the cluster.
    pub async fn container_instance_map(
        &self,
        settings: &PluginSettings,
    ) -> SchedulerResult<HashMap<String, String>> {
        let arns = self
            .ecs
            .list_container_instances(&settings.cluster_name)
            .await?;
        if arns.is_empty() {
            return Ok(HashMap::new());
        }
        let instances = self
            .ecs
            .describe_container_instances(&settings.cluster_name, &arns)
            .await?;
        Ok(instances
            .into_iter()
            .map(|i| (i.container_instance_arn, i.ec2_instance_id))
            .collect())
    }

    async fn tasks_with_definitions(
        &self,
        settings: &PluginSettings,
        desired_status: Option<DesiredStatus>,
    ) -> SchedulerResult<Vec<(Task, TaskDefinition)>> {
        let cluster = settings.cluster_name.as_str();
        let arns = self
            .ecs
            .list_tasks(ListTasks {
                cluster: cluster.to_string(),
                desired_status,
            })
            .await?;
        if arns.is_empty() {
            return Ok(Vec::new());
        }

        let tasks = self.ecs.describe_tasks(cluster, &arns).await?;

        // Tasks of one definition share a single describe call.
        let mut definitions: HashMap<String, TaskDefinition> = HashMap::new();
        let mut out = Vec::with_capacity(tasks.len());
        for task in tasks {
            let definition = match definitions.get(&task.task_definition_arn) {
                Some(d) => d.clone(),
                None => match self
                    .ecs
                    .describe_task_definition(&task.task_definition_arn)
                    .await
                {
                    Ok(d) => {
                        definitions.insert(task.task_definition_arn.clone(), d.clone());
                        d
                    }
                    // Stopped tasks outlive their deleted definitions.
                    Err(BackendError::NotFound(_)) => {
                        warn!(
                            task = %task.task_arn,
                            definition = %task.task_definition_arn,
                            "skipping task whose definition is gone"
                        );
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                },
            };
            out.push((task, definition));
        }
        debug!(%cluster, tasks = out.len(), "listed tasks");
        Ok(out)
    }
}

/// Rebuild a scheduled task from backend state.
///
/// Returns `Ok(None)` for tasks owned by another server (compared
/// case-insensitively; an absent `server-id` label means ours) and for
/// definitions without containers.
pub fn from_task_info(
    task: &Task,
    definition: &TaskDefinition,
    arn_to_instance: &HashMap<String, String>,
    server_id: &str,
) -> SchedulerResult<Option<ScheduledTask>> {
    let Some(docker_labels) = definition.primary_labels() else {
        return Ok(None);
    };
    if !labels::owned_by(docker_labels, server_id) {
        debug!(
            task = %task.task_arn,
            owner = labels::owner(docker_labels, server_id),
            %server_id,
            "ignoring task owned by another server"
        );
        return Ok(None);
    }

    let ownership = OwnershipLabels::decode(docker_labels, server_id)?;
    let target = match &task.container_instance_arn {
        Some(arn) => match arn_to_instance.get(arn) {
            Some(id) => TaskTarget::Real {
                ec2_instance_id: id.clone(),
            },
            None => TaskTarget::Unknown,
        },
        None if is_serverless(task, &ownership) => {
            TaskTarget::synthetic_for_task(ownership.profile.run_as_spot_instance, &task.task_arn)
        }
        None => TaskTarget::Unknown,
    };

    Ok(Some(ScheduledTask::new(task, definition, ownership, target)))
}

fn is_serverless(task: &Task, ownership: &OwnershipLabels) -> bool {
    task.launch_type == Some(LaunchType::Fargate)
        || task
            .capacity_provider_name
            .as_deref()
            .is_some_and(|p| p.starts_with("FARGATE"))
        || ownership.profile.is_serverless()
}

#[cfg(test)]
mod tests {
    use super::*;
    use elastic_backend::{
        Compatibility, ContainerDefinition, NetworkMode, TaskDefinitionStatus,
    };
    use elastic_core::{ElasticProfile, JobIdentifier, Labels};

    fn labels_for(server_id: Option<&str>, profile: &ElasticProfile) -> Labels {
        let mut labels = OwnershipLabels {
            server_id: server_id.unwrap_or("").to_string(),
            job_identifier: JobIdentifier {
                pipeline_name: "p".to_string(),
                pipeline_counter: 1,
                pipeline_label: "1".to_string(),
                stage_name: "s".to_string(),
                stage_counter: "1".to_string(),
                job_name: "j".to_string(),
                job_id: 9,
            },
            environment: "qa".to_string(),
            profile: profile.clone(),
        }
        .encode("elastic-agent.ecs")
        .unwrap();
        if server_id.is_none() {
            labels.remove(labels::LABEL_SERVER_ID);
        }
        labels
    }

    fn definition(labels: Labels) -> TaskDefinition {
        TaskDefinition {
            task_definition_arn: "arn:td/GoCDa:1".to_string(),
            family: "GoCDa".to_string(),
            revision: 1,
            status: TaskDefinitionStatus::Active,
            container_definitions: vec![ContainerDefinition {
                name: "GoCDa".to_string(),
                image: "gocd/agent".to_string(),
                command: Vec::new(),
                environment: Default::default(),
                docker_labels: labels,
                memory: Some(512),
                memory_reservation: None,
                cpu: 0,
                privileged: false,
                essential: true,
                mount_points: Vec::new(),
                log_configuration: None,
            }],
            network_mode: NetworkMode::Bridge,
            requires_compatibilities: vec![Compatibility::Ec2],
            cpu: None,
            memory: None,
        }
    }

    fn task(container_instance_arn: Option<&str>, launch_type: LaunchType) -> Task {
        Task {
            task_arn: "arn:task/agents/abc".to_string(),
            task_definition_arn: "arn:td/GoCDa:1".to_string(),
            cluster: "agents".to_string(),
            container_instance_arn: container_instance_arn.map(str::to_string),
            last_status: "RUNNING".to_string(),
            desired_status: DesiredStatus::Running,
            launch_type: Some(launch_type),
            capacity_provider_name: None,
            created_at: Some(1_700_000_000),
            containers: Vec::new(),
        }
    }

    #[test]
    fn ownership_is_case_insensitive() {
        let profile = ElasticProfile::new("gocd/agent", 512);
        let def = definition(labels_for(Some("server-A"), &profile));
        let t = task(Some("arn:ci/1"), LaunchType::Ec2);
        let map = HashMap::new();

        assert!(from_task_info(&t, &def, &map, "server-B").unwrap().is_none());
        assert!(from_task_info(&t, &def, &map, "SERVER-a").unwrap().is_some());
    }

    #[test]
    fn unlabelled_server_counts_as_own() {
        let profile = ElasticProfile::new("gocd/agent", 512);
        let def = definition(labels_for(None, &profile));
        let t = task(Some("arn:ci/1"), LaunchType::Ec2);
        let rebuilt = from_task_info(&t, &def, &HashMap::new(), "me").unwrap();
        assert!(rebuilt.is_some());
    }

    #[test]
    fn target_resolution() {
        let profile = ElasticProfile::new("gocd/agent", 512);
        let def = definition(labels_for(Some("me"), &profile));
        let mut map = HashMap::new();
        map.insert("arn:ci/1".to_string(), "i-0abc".to_string());

        let real = from_task_info(&task(Some("arn:ci/1"), LaunchType::Ec2), &def, &map, "me")
            .unwrap()
            .unwrap();
        assert_eq!(
            real.target,
            TaskTarget::Real {
                ec2_instance_id: "i-0abc".to_string()
            }
        );
        assert_eq!(real.environment, "qa");
        assert_eq!(real.job_identifier.job_id, 9);
        assert_eq!(real.name, "GoCDa");

        let gone = from_task_info(&task(Some("arn:ci/2"), LaunchType::Ec2), &def, &map, "me")
            .unwrap()
            .unwrap();
        assert_eq!(gone.target, TaskTarget::Unknown);

        let serverless = from_task_info(&task(None, LaunchType::Fargate), &def, &map, "me")
            .unwrap()
            .unwrap();
        assert_eq!(serverless.target.display_id(), Some("Fargateabc"));
    }

    #[test]
    fn malformed_labels_are_an_error() {
        let profile = ElasticProfile::new("gocd/agent", 512);
        let mut labels = labels_for(Some("me"), &profile);
        labels.insert(labels::LABEL_CONFIGURATION.to_string(), "{".to_string());
        let def = definition(labels);
        let err = from_task_info(&task(None, LaunchType::Ec2), &def, &HashMap::new(), "me");
        assert!(err.is_err());
    }
}
