//! Scheduler error types.

use elastic_backend::{BackendError, Failure};
use elastic_core::LabelError;
use elastic_placement::SelectionError;
use thiserror::Error;

use crate::task_spec::SpecError;

/// Errors that can occur while creating, stopping or reconciling tasks.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No instance could be selected or created. Nothing was registered.
    #[error("instance provisioning failed: {0}")]
    InstanceProvisioning(#[source] SelectionError),

    /// The backend did not start the task. The definition has already
    /// been rolled back when this is returned.
    #[error("Fail to start task {task_name}:\n{}", format_failures(.failures))]
    Launch {
        task_name: String,
        failures: Vec<Failure>,
    },

    #[error("failed to register task definition {task_name}: {source}")]
    Registration {
        task_name: String,
        #[source]
        source: BackendError,
    },

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("label error: {0}")]
    Label(#[from] LabelError),

    #[error("invalid task specification: {0}")]
    Spec(#[from] SpecError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// One line per failure: `    <arn> failed with reason :<reason>`.
pub fn format_failures(failures: &[Failure]) -> String {
    failures
        .iter()
        .map(|f| {
            format!(
                "    {} failed with reason :{}",
                f.arn.as_deref().unwrap_or("unknown"),
                f.reason
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
