//! Task definition registry client.

use std::sync::Arc;

use elastic_backend::{BackendResult, EcsApi, TaskDefinition};
use tracing::{debug, info, warn};

use crate::error::{SchedulerError, SchedulerResult};
use crate::task_spec::TaskSpecification;

/// A definition the backend accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredDefinition {
    pub arn: String,
    pub family: String,
    pub revision: u32,
    pub definition: TaskDefinition,
}

/// Registers and removes task definitions.
#[derive(Clone)]
pub struct DefinitionRegistry {
    ecs: Arc<dyn EcsApi>,
}

impl DefinitionRegistry {
    pub fn new(ecs: Arc<dyn EcsApi>) -> Self {
        Self { ecs }
    }

    pub async fn register(&self, spec: &TaskSpecification) -> SchedulerResult<RegisteredDefinition> {
        let request = spec.to_register_request();
        debug!(?request, "registering task definition");
        let definition = self
            .ecs
            .register_task_definition(request)
            .await
            .map_err(|source| SchedulerError::Registration {
                task_name: spec.name.clone(),
                source,
            })?;
        info!(
            arn = %definition.task_definition_arn,
            revision = definition.revision,
            "task definition registered"
        );
        Ok(RegisteredDefinition {
            arn: definition.task_definition_arn.clone(),
            family: definition.family.clone(),
            revision: definition.revision,
            definition,
        })
    }

    pub async fn deregister(&self, arn: &str) -> BackendResult<()> {
        self.ecs.deregister_task_definition(arn).await.map(|_| ())
    }

    pub async fn delete(&self, arn: &str) -> BackendResult<()> {
        self.ecs.delete_task_definitions(&[arn.to_string()]).await
    }

    /// Deregister then delete. Both steps run even if the first fails;
    /// failures are logged, never returned.
    pub async fn cleanup(&self, arn: &str) {
        info!(%arn, "deregistering task definition");
        if let Err(e) = self.deregister(arn).await {
            warn!(%arn, error = %e, "failed to deregister task definition");
        }
        info!(%arn, "deleting task definition");
        if let Err(e) = self.delete(arn).await {
            warn!(%arn, error = %e, "failed to delete task definition");
        }
    }
}
