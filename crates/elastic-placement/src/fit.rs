//! Instance fit scoring.
//!
//! Evaluates candidate container instances for one agent container:
//! - **Eligibility**: active, matching OS, enough remaining CPU and memory
//! - **Bin-packing** (best-fit): prefer instances that will be most full
//!   after placement, so idle instances drain and can be stopped

use elastic_backend::{ContainerDefinition, ContainerInstance};
use elastic_core::Platform;

/// What a container needs from an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitRequirements {
    pub platform: Platform,
    pub memory_mib: u32,
    pub cpu: u32,
}

impl FitRequirements {
    /// Requirements of a container definition. Memory falls back to the
    /// soft reservation when no hard limit is set.
    pub fn for_container(container: &ContainerDefinition, platform: Platform) -> Self {
        Self {
            platform,
            memory_mib: container
                .memory
                .or(container.memory_reservation)
                .unwrap_or(0),
            cpu: container.cpu,
        }
    }
}

/// Scored candidate.
#[derive(Debug, Clone)]
pub struct InstanceScore {
    pub container_instance_arn: String,
    /// Projected memory utilization after placement. Range: 0.0..=100.0.
    pub score: f64,
}

/// Score one instance, or `None` if it cannot take the container.
pub fn score_instance(
    instance: &ContainerInstance,
    req: &FitRequirements,
) -> Option<InstanceScore> {
    if !instance.is_active() {
        return None;
    }

    // Instances that don't report an OS are assumed to be linux.
    let os = instance.os_type().unwrap_or("linux");
    if !os.eq_ignore_ascii_case(req.platform.label()) {
        return None;
    }

    if instance.remaining_memory_mib < req.memory_mib || instance.remaining_cpu < req.cpu {
        return None;
    }

    let used_after = instance
        .registered_memory_mib
        .saturating_sub(instance.remaining_memory_mib)
        + req.memory_mib;
    let score = if instance.registered_memory_mib > 0 {
        (f64::from(used_after) / f64::from(instance.registered_memory_mib)).min(1.0) * 100.0
    } else {
        50.0
    };

    Some(InstanceScore {
        container_instance_arn: instance.container_instance_arn.clone(),
        score,
    })
}

/// Rank instances best-first, dropping those that don't fit. Ties keep
/// the input order.
pub fn rank_instances<'a>(
    instances: &'a [ContainerInstance],
    req: &FitRequirements,
) -> Vec<(&'a ContainerInstance, InstanceScore)> {
    let mut ranked: Vec<_> = instances
        .iter()
        .filter_map(|i| score_instance(i, req).map(|s| (i, s)))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.score
            .partial_cmp(&a.1.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}
