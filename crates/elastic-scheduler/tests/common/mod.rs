//! Shared fixtures: an orchestrator wired to the in-memory backend.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use elastic_backend::MemoryEcs;
use elastic_core::{
    BufferConsole, ConsoleLog, ElasticProfile, JobIdentifier, LaunchMode, PluginSettings,
    ScheduleRequest,
};
use elastic_placement::{MemoryInventory, SpotCapacity, StrategySelector};
use elastic_scheduler::{Reconciler, TaskOrchestrator};

pub const SERVER_ID: &str = "server-A";

/// Counts spot requests.
#[derive(Default)]
pub struct RecordingSpot {
    requests: AtomicU32,
}

impl RecordingSpot {
    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpotCapacity for RecordingSpot {
    async fn request(
        &self,
        _settings: &PluginSettings,
        _profile: &ElasticProfile,
        console: &dyn ConsoleLog,
    ) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        console.append("spot requested");
    }
}

pub struct Harness {
    pub ecs: MemoryEcs,
    pub inventory: MemoryInventory,
    pub spot: Arc<RecordingSpot>,
    pub orchestrator: TaskOrchestrator,
    pub console: BufferConsole,
    pub settings: PluginSettings,
}

impl Harness {
    pub fn new() -> Self {
        let ecs = MemoryEcs::new();
        let inventory = MemoryInventory::new(ecs.clone());
        let spot = Arc::new(RecordingSpot::default());
        let selector = StrategySelector::new(Arc::new(ecs.clone()), Arc::new(inventory.clone()));
        let orchestrator = TaskOrchestrator::new(
            Arc::new(ecs.clone()),
            Arc::new(selector),
            spot.clone(),
            SERVER_ID,
        );

        let mut settings = PluginSettings::new("https://ci.example.com/go", "agents");
        settings.subnet_ids = vec!["subnet-1".to_string()];
        settings.security_group_ids = vec!["sg-1".to_string()];

        Self {
            ecs,
            inventory,
            spot,
            orchestrator,
            console: BufferConsole::new(),
            settings,
        }
    }

    pub fn reconciler(&self, server_id: &str) -> Reconciler {
        Reconciler::new(Arc::new(self.ecs.clone()), server_id)
    }
}

pub fn job(job_id: u64) -> JobIdentifier {
    JobIdentifier {
        pipeline_name: "build".to_string(),
        pipeline_counter: 12,
        pipeline_label: "12".to_string(),
        stage_name: "test".to_string(),
        stage_counter: "1".to_string(),
        job_name: "unit".to_string(),
        job_id,
    }
}

pub fn instance_request(spot: bool) -> ScheduleRequest {
    let mut profile = ElasticProfile::new("gocd/gocd-agent-alpine", 1024);
    profile.cpu = 256;
    profile.run_as_spot_instance = spot;
    ScheduleRequest {
        job_identifier: job(1),
        environment: "prod".to_string(),
        profile,
        auto_register_key: "key".to_string(),
    }
}

pub fn serverless_request(spot: bool) -> ScheduleRequest {
    let mut request = instance_request(spot);
    request.profile.launch_mode = LaunchMode::Serverless;
    request
}
