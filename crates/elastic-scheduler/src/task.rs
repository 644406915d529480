//! Scheduled agent tasks as seen by the server.

use elastic_backend::{Task, TaskDefinition};
use elastic_core::{ElasticProfile, JobIdentifier, OwnershipLabels};
use uuid::Uuid;

/// Where a task runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskTarget {
    /// A container instance with a real EC2 id.
    Real { ec2_instance_id: String },
    /// Serverless capacity. The placeholder stands in for an instance id
    /// wherever one is displayed; it never names a real instance.
    Synthetic { placeholder: String, spot: bool },
    /// Instance-backed, but the instance is no longer registered.
    Unknown,
}

impl TaskTarget {
    /// A fresh serverless placeholder: `FargateSpot<uuid>` or `Fargate<uuid>`.
    pub fn synthetic(spot: bool) -> Self {
        Self::Synthetic {
            placeholder: placeholder(spot, &Uuid::new_v4().simple().to_string()),
            spot,
        }
    }

    /// Serverless placeholder derived from the task ARN, stable across
    /// reconciliation passes.
    pub fn synthetic_for_task(spot: bool, task_arn: &str) -> Self {
        let id = task_arn.rsplit('/').next().unwrap_or(task_arn);
        Self::Synthetic {
            placeholder: placeholder(spot, id),
            spot,
        }
    }

    /// Instance id for display: the real id or the placeholder.
    pub fn display_id(&self) -> Option<&str> {
        match self {
            TaskTarget::Real { ec2_instance_id } => Some(ec2_instance_id),
            TaskTarget::Synthetic { placeholder, .. } => Some(placeholder),
            TaskTarget::Unknown => None,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, TaskTarget::Synthetic { .. })
    }
}

fn placeholder(spot: bool, id: &str) -> String {
    if spot {
        format!("FargateSpot{id}")
    } else {
        format!("Fargate{id}")
    }
}

/// An agent task owned by this server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    /// Agent name; the definition family.
    pub name: String,
    pub task_arn: String,
    pub task_definition_arn: String,
    pub profile: ElasticProfile,
    pub job_identifier: JobIdentifier,
    pub environment: String,
    pub target: TaskTarget,
    /// Unix timestamp (seconds).
    pub created_at: Option<u64>,
    pub last_status: String,
}

impl ScheduledTask {
    pub fn new(
        task: &Task,
        definition: &TaskDefinition,
        labels: OwnershipLabels,
        target: TaskTarget,
    ) -> Self {
        Self {
            name: definition.family.clone(),
            task_arn: task.task_arn.clone(),
            task_definition_arn: definition.task_definition_arn.clone(),
            profile: labels.profile,
            job_identifier: labels.job_identifier,
            environment: labels.environment,
            target,
            created_at: task.created_at,
            last_status: task.last_status.clone(),
        }
    }
}

/// Container-level view of a running task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningContainer {
    pub task_arn: String,
    pub container_name: String,
    pub image: Option<String>,
    pub created_at: Option<u64>,
    pub last_status: String,
    /// `None` when the container carries no (or unreadable) ownership labels.
    pub labels: Option<OwnershipLabels>,
}

impl RunningContainer {
    pub fn new(task: &Task, definition: &TaskDefinition, server_id: &str) -> Self {
        let container = definition.container_definitions.first();
        let labels = definition
            .primary_labels()
            .and_then(|l| OwnershipLabels::decode(l, server_id).ok());
        Self {
            task_arn: task.task_arn.clone(),
            container_name: container
                .map(|c| c.name.clone())
                .unwrap_or_else(|| definition.family.clone()),
            image: container
                .map(|c| c.image.clone())
                .or_else(|| task.containers.first().and_then(|c| c.image.clone())),
            created_at: task.created_at,
            last_status: task.last_status.clone(),
            labels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_name_the_capacity() {
        match TaskTarget::synthetic(true) {
            TaskTarget::Synthetic { placeholder, spot } => {
                assert!(spot);
                assert!(placeholder.starts_with("FargateSpot"));
            }
            other => panic!("unexpected target {other:?}"),
        }
        let on_demand = TaskTarget::synthetic(false);
        let id = on_demand.display_id().unwrap();
        assert!(id.starts_with("Fargate") && !id.starts_with("FargateSpot"));
    }

    #[test]
    fn placeholder_from_arn_is_stable() {
        let arn = "arn:aws:ecs:local:000000000000:task/agents/00ff";
        let a = TaskTarget::synthetic_for_task(false, arn);
        let b = TaskTarget::synthetic_for_task(false, arn);
        assert_eq!(a, b);
        assert_eq!(a.display_id(), Some("Fargate00ff"));
        assert!(TaskTarget::Unknown.display_id().is_none());
    }
}
