//! Backend error types.

use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

/// Errors returned by a backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The request was well-formed but a parameter was rejected, e.g. a
    /// capacity provider strategy on a cluster without capacity providers.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, BackendError::InvalidParameter(_))
    }
}
