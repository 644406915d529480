//! The backend API consumed by the scheduler.

use async_trait::async_trait;

use crate::error::BackendResult;
use crate::model::*;

/// Task and task definition operations of the orchestration backend.
///
/// Every call is a network round trip; none of them retry. Implementations
/// must be shareable across tasks.
#[async_trait]
pub trait EcsApi: Send + Sync {
    async fn register_task_definition(
        &self,
        request: RegisterTaskDefinition,
    ) -> BackendResult<TaskDefinition>;

    /// Mark a definition inactive. Already-inactive definitions are accepted.
    async fn deregister_task_definition(&self, arn: &str) -> BackendResult<TaskDefinition>;

    /// Permanently remove inactive definitions.
    async fn delete_task_definitions(&self, arns: &[String]) -> BackendResult<()>;

    async fn describe_task_definition(&self, arn: &str) -> BackendResult<TaskDefinition>;

    /// Start a task on explicit container instances.
    async fn start_task(&self, request: StartTask) -> BackendResult<LaunchOutcome>;

    /// Run a task on backend-placed capacity.
    async fn run_task(&self, request: RunTask) -> BackendResult<LaunchOutcome>;

    async fn stop_task(&self, cluster: &str, task_arn: &str, reason: &str) -> BackendResult<Task>;

    async fn list_tasks(&self, request: ListTasks) -> BackendResult<Vec<String>>;

    /// Describe tasks. Unknown ARNs are omitted from the result.
    async fn describe_tasks(&self, cluster: &str, task_arns: &[String]) -> BackendResult<Vec<Task>>;

    async fn list_container_instances(&self, cluster: &str) -> BackendResult<Vec<String>>;

    async fn describe_container_instances(
        &self,
        cluster: &str,
        arns: &[String],
    ) -> BackendResult<Vec<ContainerInstance>>;
}
