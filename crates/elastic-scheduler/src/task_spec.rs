//! Task specification builder.
//!
//! Turns a [`ScheduleRequest`] into the single-container task definition
//! registered for one agent. Construction is pure: nothing here talks to
//! the backend.

use std::collections::BTreeMap;

use elastic_backend::{
    Compatibility, ContainerDefinition, MountPoint, NetworkMode, RegisterTaskDefinition, Volume,
};
use elastic_core::{
    ElasticProfile, LabelError, OwnershipLabels, Platform, PluginSettings, ScheduleRequest,
    StopPolicy,
};
use thiserror::Error;
use uuid::Uuid;

pub const ENV_SERVER_URL: &str = "GO_EA_SERVER_URL";
pub const ENV_AUTO_REGISTER_KEY: &str = "GO_EA_AUTO_REGISTER_KEY";
pub const ENV_AUTO_REGISTER_ENVIRONMENT: &str = "GO_EA_AUTO_REGISTER_ENVIRONMENT";
pub const ENV_ELASTIC_AGENT_ID: &str = "GO_EA_AUTO_REGISTER_ELASTIC_AGENT_ID";
pub const ENV_ELASTIC_PLUGIN_ID: &str = "GO_EA_AUTO_REGISTER_ELASTIC_PLUGIN_ID";

const DOCKER_SOCKET: &str = "/var/run/docker.sock";
const DOCKER_SOCKET_VOLUME: &str = "docker_sock";

/// Task-level CPU for serverless tasks whose profile leaves it unset.
const DEFAULT_SERVERLESS_CPU: u32 = 256;

pub type SpecResult<T> = Result<T, SpecError>;

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("profile image must not be empty")]
    EmptyImage,

    #[error("profile memory must be greater than zero")]
    ZeroMemory,

    #[error("malformed environment line {0:?}, expected KEY=VALUE")]
    MalformedEnvironment(String),

    #[error("serverless task {0} has no subnets configured")]
    NoSubnets(String),

    #[error(transparent)]
    Label(#[from] LabelError),
}

/// Everything registered for one agent task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpecification {
    /// `GoCD<uuid>`; also the definition family and container name.
    pub name: String,
    pub container: ContainerDefinition,
    pub volumes: Vec<Volume>,
    pub stop_policy: StopPolicy,
    pub network_mode: NetworkMode,
    pub compatibility: Compatibility,
    /// Task-level sizing, serverless only.
    pub task_cpu: Option<String>,
    pub task_memory: Option<String>,
    pub task_role_arn: Option<String>,
    pub execution_role_arn: Option<String>,
}

/// A fresh task name. Never reused, even across retries of the same job.
pub fn new_task_name() -> String {
    format!("GoCD{}", Uuid::new_v4().simple())
}

impl TaskSpecification {
    /// Build a specification under a freshly generated name.
    pub fn build(
        request: &ScheduleRequest,
        settings: &PluginSettings,
        server_id: &str,
    ) -> SpecResult<Self> {
        Self::build_named(new_task_name(), request, settings, server_id)
    }

    pub fn build_named(
        name: String,
        request: &ScheduleRequest,
        settings: &PluginSettings,
        server_id: &str,
    ) -> SpecResult<Self> {
        let profile = &request.profile;
        if profile.image.trim().is_empty() {
            return Err(SpecError::EmptyImage);
        }
        if profile.memory_mib == 0 {
            return Err(SpecError::ZeroMemory);
        }

        let environment = container_environment(&name, request, settings)?;
        let docker_labels = OwnershipLabels {
            server_id: server_id.to_string(),
            job_identifier: request.job_identifier.clone(),
            environment: request.environment.clone(),
            profile: profile.clone(),
        }
        .encode(&settings.plugin_id)?;

        let serverless = profile.is_serverless();
        let (volumes, mount_points) = if mounts_docker_socket(profile) {
            (
                vec![Volume {
                    name: DOCKER_SOCKET_VOLUME.to_string(),
                    host_path: Some(DOCKER_SOCKET.to_string()),
                }],
                vec![MountPoint {
                    source_volume: DOCKER_SOCKET_VOLUME.to_string(),
                    container_path: DOCKER_SOCKET.to_string(),
                    read_only: false,
                }],
            )
        } else {
            (Vec::new(), Vec::new())
        };

        let container = ContainerDefinition {
            name: name.clone(),
            image: profile.image.clone(),
            command: profile.command.clone(),
            environment,
            docker_labels,
            memory: Some(profile.memory_mib),
            memory_reservation: profile.reserved_memory_mib,
            cpu: profile.cpu,
            privileged: profile.privileged && !serverless,
            essential: true,
            mount_points,
            log_configuration: settings.log.clone(),
        };

        let (network_mode, compatibility, task_cpu, task_memory) = if serverless {
            let cpu = if profile.cpu == 0 {
                DEFAULT_SERVERLESS_CPU
            } else {
                profile.cpu
            };
            (
                NetworkMode::Awsvpc,
                Compatibility::Fargate,
                Some(cpu.to_string()),
                Some(profile.memory_mib.to_string()),
            )
        } else {
            let mode = match profile.platform {
                Platform::Linux => NetworkMode::Bridge,
                Platform::Windows => NetworkMode::Default,
            };
            (mode, Compatibility::Ec2, None, None)
        };

        Ok(Self {
            name,
            container,
            volumes,
            stop_policy: settings.stop_policy_for(profile.platform),
            network_mode,
            compatibility,
            task_cpu,
            task_memory,
            task_role_arn: profile.task_role_arn.clone(),
            execution_role_arn: profile.execution_role_arn.clone(),
        })
    }

    /// The registration request for this specification.
    pub fn to_register_request(&self) -> RegisterTaskDefinition {
        RegisterTaskDefinition {
            family: self.name.clone(),
            container_definitions: vec![self.container.clone()],
            volumes: self.volumes.clone(),
            network_mode: self.network_mode,
            requires_compatibilities: vec![self.compatibility],
            cpu: self.task_cpu.clone(),
            memory: self.task_memory.clone(),
            task_role_arn: self.task_role_arn.clone(),
            execution_role_arn: self.execution_role_arn.clone(),
        }
    }
}

// Host volumes only exist on instance-backed linux tasks.
fn mounts_docker_socket(profile: &ElasticProfile) -> bool {
    profile.mount_docker_socket && profile.platform == Platform::Linux && !profile.is_serverless()
}

/// Agent auto-registration variables, then settings-level environment,
/// then the profile's `KEY=VALUE` lines. Later entries win.
fn container_environment(
    name: &str,
    request: &ScheduleRequest,
    settings: &PluginSettings,
) -> SpecResult<BTreeMap<String, String>> {
    let mut env = BTreeMap::new();
    env.insert(ENV_SERVER_URL.to_string(), settings.go_server_url.clone());
    env.insert(
        ENV_AUTO_REGISTER_KEY.to_string(),
        request.auto_register_key.clone(),
    );
    env.insert(
        ENV_AUTO_REGISTER_ENVIRONMENT.to_string(),
        request.environment.clone(),
    );
    env.insert(ENV_ELASTIC_AGENT_ID.to_string(), name.to_string());
    env.insert(ENV_ELASTIC_PLUGIN_ID.to_string(), settings.plugin_id.clone());

    for (key, value) in &settings.environment {
        env.insert(key.clone(), value.clone());
    }

    for line in &request.profile.environment {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                env.insert(key.trim().to_string(), value.to_string());
            }
            _ => return Err(SpecError::MalformedEnvironment(line.to_string())),
        }
    }
    Ok(env)
}
