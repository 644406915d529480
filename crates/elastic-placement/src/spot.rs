//! Spot capacity seam.
//!
//! Spot requests are fire-and-forget: the caller gets no instance back and
//! learns about the resulting task only through reconciliation.

use async_trait::async_trait;
use elastic_core::{ConsoleLog, ElasticProfile, PluginSettings};
use tracing::info;

#[async_trait]
pub trait SpotCapacity: Send + Sync {
    /// Ask for spot capacity for `profile`. Must not block on fulfilment.
    async fn request(
        &self,
        settings: &PluginSettings,
        profile: &ElasticProfile,
        console: &dyn ConsoleLog,
    );
}

/// Records the request and nothing else. Used where no spot fleet exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSpotCapacity;

#[async_trait]
impl SpotCapacity for LoggingSpotCapacity {
    async fn request(
        &self,
        settings: &PluginSettings,
        profile: &ElasticProfile,
        console: &dyn ConsoleLog,
    ) {
        info!(
            cluster = %settings.cluster_name,
            platform = profile.platform.label(),
            instance_type = ?profile.instance_type,
            "spot capacity requested"
        );
        console.append(&format!(
            "Requested a {} spot instance for cluster {}.",
            profile.platform.label(),
            settings.cluster_name
        ));
    }
}
