//! MemoryEcs: an in-process backend.
//!
//! Holds task definitions, tasks and container instances behind a mutex and
//! mirrors the backend's observable rules: definitions must be deregistered
//! before they can be deleted, `describe_tasks` silently drops unknown ARNs,
//! `list_tasks` without a status filter lists only desired-RUNNING tasks,
//! and a capacity provider strategy is rejected as an invalid parameter on
//! clusters configured without capacity providers. Capacity an instance
//! gave to a started task is handed back when that task is stopped.
//!
//! Every call is appended to a journal (see [`Call`]) before it is served.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::debug;

use crate::api::EcsApi;
use crate::error::{BackendError, BackendResult};
use crate::model::*;

const ARN_PREFIX: &str = "arn:aws:ecs:local:000000000000";

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    RegisterTaskDefinition { family: String },
    DeregisterTaskDefinition { arn: String },
    DeleteTaskDefinitions { arns: Vec<String> },
    DescribeTaskDefinition { arn: String },
    StartTask(StartTask),
    RunTask(RunTask),
    StopTask { task_arn: String, reason: String },
    ListTasks(ListTasks),
    DescribeTasks { task_arns: Vec<String> },
    ListContainerInstances,
    DescribeContainerInstances { arns: Vec<String> },
}

#[derive(Default)]
struct Inner {
    definitions: BTreeMap<String, TaskDefinition>,
    revisions: HashMap<String, u32>,
    tasks: BTreeMap<String, Task>,
    instances: BTreeMap<String, ContainerInstance>,
    // Task ARN → (memory MiB, cpu units) taken from its container instance.
    reservations: HashMap<String, (u32, u32)>,
    next_task: u64,
    calls: Vec<Call>,
    // Scripted behaviour.
    capacity_providers_enabled: bool,
    launch_failures: Option<Vec<Failure>>,
    empty_launches: bool,
    start_task_error: Option<BackendError>,
    run_task_error: Option<BackendError>,
    deregister_error: Option<BackendError>,
    delete_error: Option<BackendError>,
}

/// In-memory [`EcsApi`] implementation. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryEcs {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryEcs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEcs {
    /// An empty backend whose clusters accept capacity provider strategies.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                capacity_providers_enabled: true,
                ..Inner::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Scripting ──────────────────────────────────────────────────

    /// Reject capacity provider strategies with `InvalidParameter`.
    pub fn disable_capacity_providers(&self) {
        self.lock().capacity_providers_enabled = false;
    }

    /// Every subsequent launch returns these failures and no task.
    pub fn fail_launches(&self, failures: Vec<Failure>) {
        self.lock().launch_failures = Some(failures);
    }

    /// Every subsequent launch returns neither tasks nor failures.
    pub fn return_empty_launches(&self) {
        self.lock().empty_launches = true;
    }

    /// The next `start_task` call errors instead of answering.
    pub fn fail_next_start_task(&self, error: BackendError) {
        self.lock().start_task_error = Some(error);
    }

    /// The next `run_task` call errors instead of answering.
    pub fn fail_next_run_task(&self, error: BackendError) {
        self.lock().run_task_error = Some(error);
    }

    pub fn fail_next_deregister(&self, error: BackendError) {
        self.lock().deregister_error = Some(error);
    }

    pub fn fail_next_delete(&self, error: BackendError) {
        self.lock().delete_error = Some(error);
    }

    /// Clear launch scripting so launches succeed again.
    pub fn heal(&self) {
        let mut inner = self.lock();
        inner.launch_failures = None;
        inner.empty_launches = false;
        inner.start_task_error = None;
        inner.run_task_error = None;
    }

    // ── Seeding ────────────────────────────────────────────────────

    pub fn add_container_instance(&self, instance: ContainerInstance) {
        let mut inner = self.lock();
        inner
            .instances
            .insert(instance.container_instance_arn.clone(), instance);
    }

    /// Seed a task created out-of-band, with its definition.
    pub fn insert_task(&self, task: Task, definition: TaskDefinition) {
        let mut inner = self.lock();
        inner
            .definitions
            .insert(definition.task_definition_arn.clone(), definition);
        inner.tasks.insert(task.task_arn.clone(), task);
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Definitions not yet deleted, in any status.
    pub fn definitions(&self) -> Vec<TaskDefinition> {
        self.lock().definitions.values().cloned().collect()
    }

    pub fn active_definitions(&self) -> Vec<TaskDefinition> {
        self.lock()
            .definitions
            .values()
            .filter(|d| d.status == TaskDefinitionStatus::Active)
            .cloned()
            .collect()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.values().cloned().collect()
    }

    pub fn container_instance(&self, arn: &str) -> Option<ContainerInstance> {
        self.lock().instances.get(arn).cloned()
    }
}

impl Inner {
    fn record(&mut self, call: Call) {
        debug!(?call, "memory backend call");
        self.calls.push(call);
    }

    fn scripted_outcome(&self) -> Option<LaunchOutcome> {
        if let Some(failures) = &self.launch_failures {
            return Some(LaunchOutcome {
                tasks: Vec::new(),
                failures: failures.clone(),
            });
        }
        if self.empty_launches {
            return Some(LaunchOutcome::default());
        }
        None
    }

    fn new_task(
        &mut self,
        cluster: &str,
        definition: &TaskDefinition,
        container_instance_arn: Option<String>,
        launch_type: Option<LaunchType>,
        capacity_provider_name: Option<String>,
    ) -> Task {
        self.next_task += 1;
        let task = Task {
            task_arn: format!("{ARN_PREFIX}:task/{cluster}/{:032x}", self.next_task),
            task_definition_arn: definition.task_definition_arn.clone(),
            cluster: cluster.to_string(),
            container_instance_arn,
            last_status: "PENDING".to_string(),
            desired_status: DesiredStatus::Running,
            launch_type,
            capacity_provider_name,
            created_at: Some(epoch_secs()),
            containers: definition
                .container_definitions
                .iter()
                .map(|c| Container {
                    name: c.name.clone(),
                    image: Some(c.image.clone()),
                    last_status: "PENDING".to_string(),
                })
                .collect(),
        };
        self.tasks.insert(task.task_arn.clone(), task.clone());
        task
    }

    fn active_definition(&self, arn: &str) -> BackendResult<TaskDefinition> {
        match self.definitions.get(arn) {
            Some(d) if d.status == TaskDefinitionStatus::Active => Ok(d.clone()),
            Some(_) => Err(BackendError::InvalidParameter(format!(
                "task definition {arn} is inactive"
            ))),
            None => Err(BackendError::NotFound(format!("task definition {arn}"))),
        }
    }
}

#[async_trait]
impl EcsApi for MemoryEcs {
    async fn register_task_definition(
        &self,
        request: RegisterTaskDefinition,
    ) -> BackendResult<TaskDefinition> {
        let mut inner = self.lock();
        inner.record(Call::RegisterTaskDefinition {
            family: request.family.clone(),
        });

        let revision = {
            let r = inner.revisions.entry(request.family.clone()).or_insert(0);
            *r += 1;
            *r
        };
        let definition = TaskDefinition {
            task_definition_arn: format!(
                "{ARN_PREFIX}:task-definition/{}:{revision}",
                request.family
            ),
            family: request.family,
            revision,
            status: TaskDefinitionStatus::Active,
            container_definitions: request.container_definitions,
            network_mode: request.network_mode,
            requires_compatibilities: request.requires_compatibilities,
            cpu: request.cpu,
            memory: request.memory,
        };
        inner
            .definitions
            .insert(definition.task_definition_arn.clone(), definition.clone());
        Ok(definition)
    }

    async fn deregister_task_definition(&self, arn: &str) -> BackendResult<TaskDefinition> {
        let mut inner = self.lock();
        inner.record(Call::DeregisterTaskDefinition {
            arn: arn.to_string(),
        });
        if let Some(error) = inner.deregister_error.take() {
            return Err(error);
        }
        let definition = inner
            .definitions
            .get_mut(arn)
            .ok_or_else(|| BackendError::NotFound(format!("task definition {arn}")))?;
        if definition.status == TaskDefinitionStatus::Active {
            definition.status = TaskDefinitionStatus::Inactive;
        }
        Ok(definition.clone())
    }

    async fn delete_task_definitions(&self, arns: &[String]) -> BackendResult<()> {
        let mut inner = self.lock();
        inner.record(Call::DeleteTaskDefinitions {
            arns: arns.to_vec(),
        });
        if let Some(error) = inner.delete_error.take() {
            return Err(error);
        }
        for arn in arns {
            match inner.definitions.get(arn) {
                Some(d) if d.status == TaskDefinitionStatus::Active => {
                    return Err(BackendError::InvalidParameter(format!(
                        "task definition {arn} must be deregistered before deletion"
                    )));
                }
                Some(_) => {
                    inner.definitions.remove(arn);
                }
                None => {}
            }
        }
        Ok(())
    }

    async fn describe_task_definition(&self, arn: &str) -> BackendResult<TaskDefinition> {
        let mut inner = self.lock();
        inner.record(Call::DescribeTaskDefinition {
            arn: arn.to_string(),
        });
        inner
            .definitions
            .get(arn)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("task definition {arn}")))
    }

    async fn start_task(&self, request: StartTask) -> BackendResult<LaunchOutcome> {
        let mut inner = self.lock();
        inner.record(Call::StartTask(request.clone()));
        if let Some(error) = inner.start_task_error.take() {
            return Err(error);
        }
        let definition = inner.active_definition(&request.task_definition)?;

        if let Some(outcome) = inner.scripted_outcome() {
            return Ok(outcome);
        }

        let mut outcome = LaunchOutcome::default();
        for arn in &request.container_instances {
            let Some(instance) = inner.instances.get_mut(arn) else {
                outcome.failures.push(Failure {
                    arn: Some(arn.clone()),
                    reason: "MISSING".to_string(),
                });
                continue;
            };
            let memory = definition
                .container_definitions
                .iter()
                .map(|c| c.memory.or(c.memory_reservation).unwrap_or(0))
                .sum::<u32>();
            let cpu = definition
                .container_definitions
                .iter()
                .map(|c| c.cpu)
                .sum::<u32>();
            if instance.remaining_memory_mib < memory {
                outcome.failures.push(Failure {
                    arn: Some(arn.clone()),
                    reason: "RESOURCE:MEMORY".to_string(),
                });
                continue;
            }
            if instance.remaining_cpu < cpu {
                outcome.failures.push(Failure {
                    arn: Some(arn.clone()),
                    reason: "RESOURCE:CPU".to_string(),
                });
                continue;
            }
            instance.remaining_memory_mib -= memory;
            instance.remaining_cpu -= cpu;
            instance.pending_tasks_count += 1;

            let task = inner.new_task(
                &request.cluster,
                &definition,
                Some(arn.clone()),
                Some(LaunchType::Ec2),
                None,
            );
            inner
                .reservations
                .insert(task.task_arn.clone(), (memory, cpu));
            outcome.tasks.push(task);
        }
        Ok(outcome)
    }

    async fn run_task(&self, request: RunTask) -> BackendResult<LaunchOutcome> {
        let mut inner = self.lock();
        inner.record(Call::RunTask(request.clone()));
        if let Some(error) = inner.run_task_error.take() {
            return Err(error);
        }
        if !request.capacity_provider_strategy.is_empty() && !inner.capacity_providers_enabled {
            return Err(BackendError::InvalidParameter(
                "the specified capacity provider strategy cannot contain a capacity provider \
                 that is not associated with the cluster"
                    .to_string(),
            ));
        }
        let definition = inner.active_definition(&request.task_definition)?;

        if let Some(outcome) = inner.scripted_outcome() {
            return Ok(outcome);
        }

        let provider = request
            .capacity_provider_strategy
            .first()
            .map(|item| item.capacity_provider.clone());
        let launch_type = if provider.is_some() {
            None
        } else {
            request.launch_type
        };
        let task = inner.new_task(&request.cluster, &definition, None, launch_type, provider);
        Ok(LaunchOutcome {
            tasks: vec![task],
            failures: Vec::new(),
        })
    }

    async fn stop_task(&self, cluster: &str, task_arn: &str, reason: &str) -> BackendResult<Task> {
        let mut inner = self.lock();
        inner.record(Call::StopTask {
            task_arn: task_arn.to_string(),
            reason: reason.to_string(),
        });
        let task = inner
            .tasks
            .get_mut(task_arn)
            .filter(|t| t.cluster == cluster)
            .ok_or_else(|| BackendError::NotFound(format!("task {task_arn}")))?;
        let already_stopped = task.desired_status == DesiredStatus::Stopped;
        task.desired_status = DesiredStatus::Stopped;
        task.last_status = "STOPPED".to_string();
        let task = task.clone();
        if already_stopped {
            return Ok(task);
        }

        let reserved = inner.reservations.remove(task_arn);
        if let Some(arn) = &task.container_instance_arn {
            if let Some(instance) = inner.instances.get_mut(arn) {
                instance.pending_tasks_count = instance.pending_tasks_count.saturating_sub(1);
                if let Some((memory, cpu)) = reserved {
                    instance.remaining_memory_mib = instance
                        .remaining_memory_mib
                        .saturating_add(memory)
                        .min(instance.registered_memory_mib);
                    instance.remaining_cpu = instance
                        .remaining_cpu
                        .saturating_add(cpu)
                        .min(instance.registered_cpu);
                }
            }
        }
        Ok(task)
    }

    async fn list_tasks(&self, request: ListTasks) -> BackendResult<Vec<String>> {
        let mut inner = self.lock();
        inner.record(Call::ListTasks(request.clone()));
        let status = request.desired_status.unwrap_or(DesiredStatus::Running);
        Ok(inner
            .tasks
            .values()
            .filter(|t| t.cluster == request.cluster)
            .filter(|t| t.desired_status == status)
            .map(|t| t.task_arn.clone())
            .collect())
    }

    async fn describe_tasks(&self, cluster: &str, task_arns: &[String]) -> BackendResult<Vec<Task>> {
        let mut inner = self.lock();
        inner.record(Call::DescribeTasks {
            task_arns: task_arns.to_vec(),
        });
        Ok(task_arns
            .iter()
            .filter_map(|arn| inner.tasks.get(arn))
            .filter(|t| t.cluster == cluster)
            .cloned()
            .collect())
    }

    async fn list_container_instances(&self, _cluster: &str) -> BackendResult<Vec<String>> {
        let mut inner = self.lock();
        inner.record(Call::ListContainerInstances);
        Ok(inner.instances.keys().cloned().collect())
    }

    async fn describe_container_instances(
        &self,
        _cluster: &str,
        arns: &[String],
    ) -> BackendResult<Vec<ContainerInstance>> {
        let mut inner = self.lock();
        inner.record(Call::DescribeContainerInstances {
            arns: arns.to_vec(),
        });
        Ok(arns
            .iter()
            .filter_map(|arn| inner.instances.get(arn))
            .cloned()
            .collect())
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
