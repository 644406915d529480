//! Selection strategies, one per stop policy.

use elastic_backend::ContainerInstance;
use elastic_core::StopPolicy;
use tracing::debug;

use crate::fit::{FitRequirements, rank_instances};

/// How an existing instance is chosen for a new task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Pack onto any running instance with room. Instances outlive their
    /// tasks (they are only stopped when idle), so sharing is cheap.
    RunningInstanceReuse,
    /// Only hand out instances with nothing on them. Instances are
    /// terminated once idle, so a busy one is never topped up and a
    /// shortage means creating a new instance.
    OnDemandCreate,
}

/// Strategy factory.
pub fn strategy_for(policy: StopPolicy) -> SelectionStrategy {
    match policy {
        StopPolicy::StopIdleInstance => SelectionStrategy::RunningInstanceReuse,
        StopPolicy::TerminateIdleInstance => SelectionStrategy::OnDemandCreate,
    }
}

impl SelectionStrategy {
    /// Pick the best candidate, or `None` when a new instance is needed.
    pub fn select<'a>(
        &self,
        candidates: &'a [ContainerInstance],
        req: &FitRequirements,
    ) -> Option<&'a ContainerInstance> {
        let ranked = rank_instances(candidates, req);
        debug!(strategy = ?self, eligible = ranked.len(), "ranked container instances");

        match self {
            SelectionStrategy::RunningInstanceReuse => ranked.first().map(|(i, _)| *i),
            SelectionStrategy::OnDemandCreate => ranked
                .into_iter()
                .map(|(i, _)| i)
                .find(|i| i.is_idle()),
        }
    }
}
