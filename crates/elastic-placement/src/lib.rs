//! elastic-placement: picks the container instance an agent task runs on.
//!
//! This crate answers one question for instance-backed launches: is there
//! an existing container instance this task can go to, and if not, how do
//! we get one? It does NOT register or launch tasks (that's
//! `elastic-scheduler`).
//!
//! # Components
//!
//! - **`fit`**: Instance fit scoring (platform, capacity, bin-packing)
//! - **`strategy`**: Selection strategies keyed on the stop policy
//! - **`selector`**: The `InstanceSelector` seam and its backend-driven implementation
//! - **`spot`**: The fire-and-forget spot capacity seam
//! - **`memory`**: In-memory inventory used by tests and simulation

pub mod error;
pub mod fit;
pub mod memory;
pub mod selector;
pub mod spot;
pub mod strategy;

pub use error::{SelectionError, SelectionResult};
pub use fit::{FitRequirements, InstanceScore, rank_instances, score_instance};
pub use memory::MemoryInventory;
pub use selector::{BackingTarget, InstanceInventory, InstanceSelector, StrategySelector};
pub use spot::{LoggingSpotCapacity, SpotCapacity};
pub use strategy::{SelectionStrategy, strategy_for};
