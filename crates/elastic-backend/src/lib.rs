//! elastic-backend: the container backend boundary.
//!
//! The scheduler talks to the orchestration backend only through the
//! [`EcsApi`] trait: registering and removing task definitions, starting
//! tasks on container instances, running serverless tasks, and listing or
//! describing what is currently in the cluster.
//!
//! [`MemoryEcs`] implements the trait in process. It keeps definitions,
//! tasks and container instances in memory, can be scripted to fail
//! launches or reject capacity provider strategies, and records every call
//! so callers can assert on the exact sequence issued.

pub mod api;
pub mod error;
pub mod memory;
pub mod model;

pub use api::EcsApi;
pub use error::{BackendError, BackendResult};
pub use memory::{Call, MemoryEcs};
pub use model::*;
