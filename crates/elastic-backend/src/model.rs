//! Wire model for the backend's task and task definition API.
//!
//! Field names follow the backend's JSON shape (camelCase) so a rendered
//! registration request reads the same as the one sent over the wire.

use std::collections::BTreeMap;

use elastic_core::{Labels, LogConfiguration};
use serde::{Deserialize, Serialize};

// ── Task definitions ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    Bridge,
    Awsvpc,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Compatibility {
    Ec2,
    Fargate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountPoint {
    pub source_volume: String,
    pub container_path: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    pub host_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDefinition {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub docker_labels: Labels,
    /// Hard limit in MiB.
    pub memory: Option<u32>,
    /// Soft reservation in MiB.
    pub memory_reservation: Option<u32>,
    #[serde(default)]
    pub cpu: u32,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub essential: bool,
    #[serde(default)]
    pub mount_points: Vec<MountPoint>,
    pub log_configuration: Option<LogConfiguration>,
}

/// Body of a task definition registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTaskDefinition {
    pub family: String,
    pub container_definitions: Vec<ContainerDefinition>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    pub network_mode: NetworkMode,
    pub requires_compatibilities: Vec<Compatibility>,
    /// Task-level CPU units; required for serverless tasks.
    pub cpu: Option<String>,
    /// Task-level memory in MiB; required for serverless tasks.
    pub memory: Option<String>,
    pub task_role_arn: Option<String>,
    pub execution_role_arn: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskDefinitionStatus {
    Active,
    Inactive,
    DeleteInProgress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub task_definition_arn: String,
    pub family: String,
    pub revision: u32,
    pub status: TaskDefinitionStatus,
    pub container_definitions: Vec<ContainerDefinition>,
    pub network_mode: NetworkMode,
    pub requires_compatibilities: Vec<Compatibility>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

impl TaskDefinition {
    /// Labels of the first container, where ownership labels live.
    pub fn primary_labels(&self) -> Option<&Labels> {
        self.container_definitions.first().map(|c| &c.docker_labels)
    }
}

// ── Launching ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LaunchType {
    Ec2,
    Fargate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityProviderStrategyItem {
    pub capacity_provider: String,
    pub weight: u32,
    pub base: u32,
}

impl CapacityProviderStrategyItem {
    pub fn new(capacity_provider: impl Into<String>) -> Self {
        Self {
            capacity_provider: capacity_provider.into(),
            weight: 1,
            base: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsVpcConfiguration {
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfiguration {
    pub awsvpc_configuration: AwsVpcConfiguration,
}

/// Place a task on specific container instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTask {
    pub cluster: String,
    pub task_definition: String,
    pub container_instances: Vec<String>,
    pub started_by: Option<String>,
}

/// Let the backend place a task, by capacity provider strategy or launch type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTask {
    pub cluster: String,
    pub task_definition: String,
    #[serde(default)]
    pub capacity_provider_strategy: Vec<CapacityProviderStrategyItem>,
    pub launch_type: Option<LaunchType>,
    pub network_configuration: Option<NetworkConfiguration>,
    pub started_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub arn: Option<String>,
    pub reason: String,
}

/// Response of `start_task` / `run_task`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOutcome {
    pub tasks: Vec<Task>,
    pub failures: Vec<Failure>,
}

impl LaunchOutcome {
    /// Started iff nothing failed and at least one task came back.
    pub fn is_started(&self) -> bool {
        self.failures.is_empty() && !self.tasks.is_empty()
    }
}

// ── Tasks ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DesiredStatus {
    Running,
    Pending,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: Option<String>,
    pub last_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_arn: String,
    pub task_definition_arn: String,
    pub cluster: String,
    /// Absent for serverless tasks.
    pub container_instance_arn: Option<String>,
    pub last_status: String,
    pub desired_status: DesiredStatus,
    pub launch_type: Option<LaunchType>,
    pub capacity_provider_name: Option<String>,
    /// Unix timestamp (seconds).
    pub created_at: Option<u64>,
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasks {
    pub cluster: String,
    pub desired_status: Option<DesiredStatus>,
}

// ── Container instances ────────────────────────────────────────────

/// A registered instance able to host instance-backed tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInstance {
    pub container_instance_arn: String,
    pub ec2_instance_id: String,
    /// `ACTIVE`, `DRAINING`, ...
    pub status: String,
    pub running_tasks_count: u32,
    pub pending_tasks_count: u32,
    pub registered_cpu: u32,
    pub registered_memory_mib: u32,
    pub remaining_cpu: u32,
    pub remaining_memory_mib: u32,
    /// Includes `ecs.os-type` (`linux` / `windows`).
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ContainerInstance {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("ACTIVE")
    }

    pub fn is_idle(&self) -> bool {
        self.running_tasks_count == 0 && self.pending_tasks_count == 0
    }

    pub fn os_type(&self) -> Option<&str> {
        self.attributes.get("ecs.os-type").map(String::as_str)
    }
}
