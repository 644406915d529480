//! Instance selection seam and its backend-driven implementation.

use std::sync::Arc;

use async_trait::async_trait;
use elastic_backend::{ContainerDefinition, ContainerInstance, EcsApi};
use elastic_core::{ConsoleLog, ElasticProfile, PluginSettings};
use tracing::{debug, info};

use crate::error::{SelectionError, SelectionResult};
use crate::fit::FitRequirements;
use crate::strategy::strategy_for;

/// An addressable container instance a task can be started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackingTarget {
    pub container_instance_arn: String,
    pub ec2_instance_id: String,
}

impl From<&ContainerInstance> for BackingTarget {
    fn from(instance: &ContainerInstance) -> Self {
        Self {
            container_instance_arn: instance.container_instance_arn.clone(),
            ec2_instance_id: instance.ec2_instance_id.clone(),
        }
    }
}

/// Finds or creates the instance an instance-backed task runs on.
#[async_trait]
pub trait InstanceSelector: Send + Sync {
    /// An existing instance able to take `container`, if any.
    async fn instance_for_scheduling(
        &self,
        settings: &PluginSettings,
        profile: &ElasticProfile,
        container: &ContainerDefinition,
    ) -> SelectionResult<Option<BackingTarget>>;

    /// Create a new instance and wait until it can take tasks.
    async fn create_instance(
        &self,
        settings: &PluginSettings,
        profile: &ElasticProfile,
        console: &dyn ConsoleLog,
    ) -> SelectionResult<BackingTarget>;
}

/// Brings up new on-demand instances. Returns once the instance has
/// joined the cluster.
#[async_trait]
pub trait InstanceInventory: Send + Sync {
    async fn provision(
        &self,
        settings: &PluginSettings,
        profile: &ElasticProfile,
        console: &dyn ConsoleLog,
    ) -> SelectionResult<ContainerInstance>;
}

/// Selects among the cluster's registered instances using the strategy
/// implied by the profile's platform stop policy.
pub struct StrategySelector {
    ecs: Arc<dyn EcsApi>,
    inventory: Arc<dyn InstanceInventory>,
}

impl StrategySelector {
    pub fn new(ecs: Arc<dyn EcsApi>, inventory: Arc<dyn InstanceInventory>) -> Self {
        Self { ecs, inventory }
    }

    async fn cluster_instances(&self, cluster: &str) -> SelectionResult<Vec<ContainerInstance>> {
        let arns = self.ecs.list_container_instances(cluster).await?;
        if arns.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.ecs.describe_container_instances(cluster, &arns).await?)
    }
}

#[async_trait]
impl InstanceSelector for StrategySelector {
    async fn instance_for_scheduling(
        &self,
        settings: &PluginSettings,
        profile: &ElasticProfile,
        container: &ContainerDefinition,
    ) -> SelectionResult<Option<BackingTarget>> {
        let strategy = strategy_for(settings.stop_policy_for(profile.platform));
        let req = FitRequirements::for_container(container, profile.platform);
        let candidates = self.cluster_instances(&settings.cluster_name).await?;

        let picked = strategy.select(&candidates, &req).map(BackingTarget::from);
        debug!(
            cluster = %settings.cluster_name,
            candidates = candidates.len(),
            ?strategy,
            picked = ?picked.as_ref().map(|t| &t.ec2_instance_id),
            "instance selection"
        );
        Ok(picked)
    }

    async fn create_instance(
        &self,
        settings: &PluginSettings,
        profile: &ElasticProfile,
        console: &dyn ConsoleLog,
    ) -> SelectionResult<BackingTarget> {
        let provisioned = self.inventory.provision(settings, profile, console).await?;

        // The instance is only usable once the cluster knows about it.
        let arn = provisioned.container_instance_arn.clone();
        let registered = self
            .ecs
            .describe_container_instances(&settings.cluster_name, std::slice::from_ref(&arn))
            .await?;
        let instance = registered
            .iter()
            .find(|i| i.container_instance_arn == arn)
            .ok_or_else(|| SelectionError::NotRegistered(provisioned.ec2_instance_id.clone()))?;

        info!(
            ec2_instance_id = %instance.ec2_instance_id,
            cluster = %settings.cluster_name,
            "created container instance"
        );
        Ok(BackingTarget::from(instance))
    }
}
