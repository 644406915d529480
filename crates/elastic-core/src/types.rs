//! Shared types used across the elastic agent crates.

use serde::{Deserialize, Serialize};

/// Operating system family an agent container runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    #[default]
    Linux,
    Windows,
}

impl Platform {
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Linux => "LINUX",
            Platform::Windows => "WINDOWS",
        }
    }
}

/// What happens to a backing instance once it has no agent tasks left.
///
/// The stop policy also selects how an instance is picked for a new task
/// (see `elastic-placement`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StopPolicy {
    /// Idle instances are stopped and may be started again later.
    #[default]
    StopIdleInstance,
    /// Idle instances are terminated; every shortage means a new instance.
    TerminateIdleInstance,
}

/// How a task gets its compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    /// Task runs on a container instance we select or create.
    #[default]
    InstanceBacked,
    /// Backend-managed capacity (Fargate); there is no addressable instance.
    Serverless,
}

/// Per-profile agent configuration.
///
/// Serialized verbatim into the `configuration` label of every task
/// definition, so field names are part of the label contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticProfile {
    /// Docker image for the agent container.
    pub image: String,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub launch_mode: LaunchMode,
    /// Willing to run on preemptible capacity.
    #[serde(default)]
    pub run_as_spot_instance: bool,
    /// Hard memory limit in MiB.
    pub memory_mib: u32,
    /// Soft memory reservation in MiB.
    #[serde(default)]
    pub reserved_memory_mib: Option<u32>,
    /// CPU units (1024 = one vCPU).
    #[serde(default)]
    pub cpu: u32,
    #[serde(default)]
    pub command: Vec<String>,
    /// `KEY=VALUE` lines appended to the container environment.
    #[serde(default)]
    pub environment: Vec<String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub mount_docker_socket: bool,
    #[serde(default)]
    pub task_role_arn: Option<String>,
    #[serde(default)]
    pub execution_role_arn: Option<String>,
    /// Overrides the settings-level subnets when non-empty.
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    /// Overrides the settings-level security groups when non-empty.
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    /// Hints forwarded to instance creation.
    #[serde(default)]
    pub instance_type: Option<String>,
    #[serde(default)]
    pub ami_id: Option<String>,
}

impl ElasticProfile {
    /// Minimal profile for an image, everything else defaulted.
    pub fn new(image: impl Into<String>, memory_mib: u32) -> Self {
        Self {
            image: image.into(),
            platform: Platform::default(),
            launch_mode: LaunchMode::default(),
            run_as_spot_instance: false,
            memory_mib,
            reserved_memory_mib: None,
            cpu: 0,
            command: Vec::new(),
            environment: Vec::new(),
            privileged: false,
            mount_docker_socket: false,
            task_role_arn: None,
            execution_role_arn: None,
            subnet_ids: Vec::new(),
            security_group_ids: Vec::new(),
            instance_type: None,
            ami_id: None,
        }
    }

    pub fn is_serverless(&self) -> bool {
        self.launch_mode == LaunchMode::Serverless
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Identity of the job an agent is being provisioned for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobIdentifier {
    pub pipeline_name: String,
    pub pipeline_counter: u64,
    pub pipeline_label: String,
    pub stage_name: String,
    pub stage_counter: String,
    pub job_name: String,
    pub job_id: u64,
}

impl JobIdentifier {
    /// `pipeline/counter/stage/counter/job`, the form shown to users.
    pub fn represent(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.pipeline_name,
            self.pipeline_counter,
            self.stage_name,
            self.stage_counter,
            self.job_name
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// A request to provision one agent task. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub job_identifier: JobIdentifier,
    /// Environment the agent auto-registers into.
    #[serde(default)]
    pub environment: String,
    pub profile: ElasticProfile,
    /// Key the agent presents when auto-registering with the server.
    #[serde(default)]
    pub auto_register_key: String,
}
