//! In-memory view of this server's agent tasks and the loop that keeps it
//! in step with the backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use elastic_core::PluginSettings;
use tokio::sync::{RwLock, watch};
use tracing::{debug, error, info, warn};

use crate::error::SchedulerResult;
use crate::reconcile::{Reconciler, from_task_info};
use crate::task::ScheduledTask;

/// Agent name → task. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<String, ScheduledTask>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, task: ScheduledTask) {
        self.tasks.write().await.insert(task.name.clone(), task);
    }

    pub async fn remove(&self, name: &str) -> Option<ScheduledTask> {
        self.tasks.write().await.remove(name)
    }

    pub async fn get(&self, name: &str) -> Option<ScheduledTask> {
        self.tasks.read().await.get(name).cloned()
    }

    /// All tasks, sorted by name.
    pub async fn list(&self) -> Vec<ScheduledTask> {
        let mut tasks: Vec<_> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        tasks
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Replace the contents. Serverless placeholders already handed out
    /// are kept so an agent's displayed instance id doesn't change.
    pub async fn replace_all(&self, tasks: Vec<ScheduledTask>) {
        let mut guard = self.tasks.write().await;
        let mut next = HashMap::with_capacity(tasks.len());
        for mut task in tasks {
            if let Some(previous) = guard.get(&task.name) {
                if previous.target.is_synthetic() && task.target.is_synthetic() {
                    task.target = previous.target.clone();
                }
            }
            next.insert(task.name.clone(), task);
        }
        *guard = next;
    }
}

/// Periodically rebuilds a [`TaskRegistry`] from the backend.
pub struct ReconcileLoop {
    reconciler: Arc<Reconciler>,
    registry: TaskRegistry,
    settings: Arc<PluginSettings>,
}

impl ReconcileLoop {
    pub fn new(
        reconciler: Arc<Reconciler>,
        registry: TaskRegistry,
        settings: Arc<PluginSettings>,
    ) -> Self {
        Self {
            reconciler,
            registry,
            settings,
        }
    }

    /// One pass. Tasks whose labels can't be read are skipped with a
    /// warning. Returns the number of tasks now in the registry.
    pub async fn refresh_all(&self) -> SchedulerResult<usize> {
        let server_id = self.reconciler.server_id();
        let tasks = self.reconciler.list_all_tasks(&self.settings).await?;
        let instances = self
            .reconciler
            .container_instance_map(&self.settings)
            .await?;

        let mut owned = Vec::new();
        for (task, definition) in &tasks {
            match from_task_info(task, definition, &instances, server_id) {
                Ok(Some(scheduled)) => owned.push(scheduled),
                Ok(None) => {}
                Err(e) => warn!(task = %task.task_arn, error = %e, "skipping unreadable task"),
            }
        }

        let count = owned.len();
        self.registry.replace_all(owned).await;
        debug!(listed = tasks.len(), owned = count, "reconciled tasks");
        Ok(count)
    }

    /// [`run`](Self::run) at the settings' `reconcile_interval_secs`.
    pub async fn run_configured(&self, shutdown: watch::Receiver<bool>) {
        self.run(self.settings.reconcile_interval(), shutdown).await
    }

    /// Run until `shutdown` changes. Failed passes are logged and retried
    /// on the next tick.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "reconcile loop started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.refresh_all().await {
                        error!(error = %e, "reconciliation failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("reconcile loop shutting down");
                    break;
                }
            }
        }
    }
}
