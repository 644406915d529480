//! Instance selection error types.

use elastic_backend::BackendError;
use thiserror::Error;

/// Errors raised while selecting or provisioning an instance.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("instance provisioning failed: {0}")]
    Provisioning(String),

    #[error("provisioned instance {0} never registered with the cluster")]
    NotRegistered(String),
}

pub type SelectionResult<T> = Result<T, SelectionError>;
