//! In-memory instance inventory backed by a [`MemoryEcs`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use elastic_backend::{ContainerInstance, MemoryEcs};
use elastic_core::{ConsoleLog, ElasticProfile, Platform, PluginSettings};
use tracing::info;

use crate::error::{SelectionError, SelectionResult};
use crate::selector::InstanceInventory;

/// "Provisions" instances by registering them directly with a memory
/// backend. Clones share the counter and scripting.
#[derive(Clone)]
pub struct MemoryInventory {
    ecs: MemoryEcs,
    cpu: u32,
    memory_mib: u32,
    provisioned: Arc<AtomicU32>,
    fail_next: Arc<AtomicBool>,
}

impl MemoryInventory {
    /// Instances with 4 vCPU and 8 GiB.
    pub fn new(ecs: MemoryEcs) -> Self {
        Self::with_capacity(ecs, 4096, 8192)
    }

    pub fn with_capacity(ecs: MemoryEcs, cpu: u32, memory_mib: u32) -> Self {
        Self {
            ecs,
            cpu,
            memory_mib,
            provisioned: Arc::new(AtomicU32::new(0)),
            fail_next: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The next `provision` call fails.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of instances provisioned so far.
    pub fn provisioned(&self) -> u32 {
        self.provisioned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InstanceInventory for MemoryInventory {
    async fn provision(
        &self,
        settings: &PluginSettings,
        profile: &ElasticProfile,
        console: &dyn ConsoleLog,
    ) -> SelectionResult<ContainerInstance> {
        console.append(&format!(
            "Creating a new {} container instance in cluster {}.",
            profile.platform.label(),
            settings.cluster_name
        ));
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SelectionError::Provisioning(
                "instance limit exceeded".to_string(),
            ));
        }

        let n = self.provisioned.fetch_add(1, Ordering::SeqCst) + 1;
        let os = match profile.platform {
            Platform::Linux => "linux",
            Platform::Windows => "windows",
        };
        let mut attributes = BTreeMap::new();
        attributes.insert("ecs.os-type".to_string(), os.to_string());
        if let Some(instance_type) = &profile.instance_type {
            attributes.insert("ecs.instance-type".to_string(), instance_type.clone());
        }

        let instance = ContainerInstance {
            container_instance_arn: format!(
                "arn:aws:ecs:local:000000000000:container-instance/{}/{n:08}",
                settings.cluster_name
            ),
            ec2_instance_id: format!("i-{n:017x}"),
            status: "ACTIVE".to_string(),
            running_tasks_count: 0,
            pending_tasks_count: 0,
            registered_cpu: self.cpu,
            registered_memory_mib: self.memory_mib,
            remaining_cpu: self.cpu,
            remaining_memory_mib: self.memory_mib,
            attributes,
        };
        self.ecs.add_container_instance(instance.clone());
        info!(ec2_instance_id = %instance.ec2_instance_id, os, "provisioned memory instance");
        Ok(instance)
    }
}
