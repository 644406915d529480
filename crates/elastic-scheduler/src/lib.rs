//! elastic-scheduler: provisioning and reconciling build-agent tasks.
//!
//! Turns a `ScheduleRequest` (from `elastic-core`) into a running task on
//! the container backend (`elastic-backend`). The orchestrator:
//!
//! - Builds the task specification (name, environment, ownership labels)
//! - Resolves an instance via `elastic-placement`, or hands off to spot
//! - Registers the definition, launches, and rolls back on failure
//! - Stops tasks and removes their definitions
//!
//! The reconciler rebuilds this server's task view from backend state,
//! and `ReconcileLoop` does so on a fixed interval.
//!
//! # Architecture
//!
//! ```text
//! TaskOrchestrator
//!   ├── TaskSpecification (pure builder)
//!   ├── InstanceSelector / SpotCapacity (instance-backed targets)
//!   ├── DefinitionRegistry (register, cleanup)
//!   └── EcsApi (start_task / run_task / stop_task)
//!
//! ReconcileLoop
//!   ├── Reconciler (list, describe, from_task_info)
//!   └── TaskRegistry (name → ScheduledTask)
//! ```

pub mod error;
pub mod orchestrator;
pub mod reconcile;
pub mod registry;
pub mod task;
pub mod task_registry;
pub mod task_spec;

pub use error::{SchedulerError, SchedulerResult, format_failures};
pub use orchestrator::{FARGATE, FARGATE_SPOT, LaunchPlan, LaunchState, TaskOrchestrator};
pub use reconcile::{Reconciler, from_task_info};
pub use registry::{DefinitionRegistry, RegisteredDefinition};
pub use task::{RunningContainer, ScheduledTask, TaskTarget};
pub use task_registry::{ReconcileLoop, TaskRegistry};
pub use task_spec::{SpecError, SpecResult, TaskSpecification, new_task_name};
