//! The swarm coordinator.
//!
//! [`SwarmCoordinator`] owns the task queue, the worker registry and the
//! result stores. Callers submit tasks and poll for status; a single control
//! loop ([`SwarmCoordinator::run`]) places pending work on idle workers and
//! spawns one execution unit per placement.
//!
//! # Locking
//!
//! Shared state sits behind three `RwLock`s that are always acquired in the
//! order queue, registry, results. None of them is held across an analysis
//! call.

mod control_loop;
mod execution;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::analysis::{AnalysisReport, AnalysisSuite};
use crate::config::SwarmConfig;
use crate::error::{Result, SwarmError};
use crate::scheduler::{
    Capability, ResultStores, SwarmMetrics, Task, TaskAssigner, TaskParameters, TaskQueue,
    TaskRecord, TaskStatus, TaskType,
};
use crate::worker::{TaskExecutor, Worker, WorkerRegistry, WorkerStatus};

const HEARTBEAT_CHANNEL_CAPACITY: usize = 1024;

/// What a caller sees when asking about a task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatusReport {
    pub task_id: String,
    pub task_type: TaskType,
    pub target_address: String,
    pub priority: i32,
    pub status: TaskStatus,
    pub assigned_worker: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub result: Option<AnalysisReport>,
    pub error: Option<String>,
}

impl From<&Task> for TaskStatusReport {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            task_type: task.task_type(),
            target_address: task.target_address.clone(),
            priority: task.priority,
            status: task.status,
            assigned_worker: task.assigned_worker.clone(),
            created_at: task.created_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
            duration_ms: None,
            result: None,
            error: None,
        }
    }
}

impl From<&TaskRecord> for TaskStatusReport {
    fn from(record: &TaskRecord) -> Self {
        Self {
            duration_ms: record.duration_ms,
            result: record.result.clone(),
            error: record.error.clone(),
            ..Self::from(&record.task)
        }
    }
}

/// Result of [`SwarmCoordinator::wait_for_completion`]. Running out of time
/// is not an error: the task keeps going and stays pollable.
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    Finished(TaskStatusReport),
    StillRunning(TaskStatusReport),
}

impl WaitOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, WaitOutcome::Finished(_))
    }

    pub fn report(&self) -> &TaskStatusReport {
        match self {
            WaitOutcome::Finished(report) | WaitOutcome::StillRunning(report) => report,
        }
    }

    pub fn into_report(self) -> TaskStatusReport {
        match self {
            WaitOutcome::Finished(report) | WaitOutcome::StillRunning(report) => report,
        }
    }
}

/// Point-in-time view of the whole swarm.
#[derive(Debug, Clone, Serialize)]
pub struct SwarmStatus {
    pub total_workers: usize,
    pub idle_workers: usize,
    pub busy_workers: usize,
    pub offline_workers: usize,
    pub pending_tasks: usize,
    pub assigned_tasks: usize,
    pub running_tasks: usize,
    /// Retained in the completed store.
    pub completed_tasks: usize,
    /// Retained in the failed store.
    pub failed_tasks: usize,
    pub performance: SwarmMetrics,
    pub workers: Vec<Worker>,
    pub uptime_secs: i64,
}

pub struct SwarmCoordinator {
    config: SwarmConfig,
    queue: Arc<RwLock<TaskQueue>>,
    registry: Arc<RwLock<WorkerRegistry>>,
    results: Arc<RwLock<ResultStores>>,
    metrics: RwLock<SwarmMetrics>,
    assigner: TaskAssigner,
    executor: TaskExecutor,
    heartbeat_tx: mpsc::Sender<String>,
    heartbeat_rx: Mutex<Option<mpsc::Receiver<String>>>,
    started_at: DateTime<Utc>,
}

impl SwarmCoordinator {
    /// Build a coordinator and register the configured worker pool.
    pub fn new(config: SwarmConfig, analyzers: AnalysisSuite) -> Self {
        let mut registry = WorkerRegistry::new();
        for worker in &config.workers {
            if let Err(e) =
                registry.register(&worker.id, &worker.worker_type, worker.capabilities.clone())
            {
                tracing::warn!(worker_id = %worker.id, error = %e, "Skipping configured worker");
            }
        }

        let (heartbeat_tx, heartbeat_rx) = mpsc::channel(HEARTBEAT_CHANNEL_CAPACITY);

        Self {
            queue: Arc::new(RwLock::new(TaskQueue::with_capacity(config.max_queued_tasks))),
            registry: Arc::new(RwLock::new(registry)),
            results: Arc::new(RwLock::new(ResultStores::new(
                config.completed_retention,
                config.failed_retention,
            ))),
            metrics: RwLock::new(SwarmMetrics::default()),
            assigner: TaskAssigner::new(config.heartbeat_timeout()),
            executor: TaskExecutor::new(analyzers),
            heartbeat_tx,
            heartbeat_rx: Mutex::new(Some(heartbeat_rx)),
            started_at: Utc::now(),
            config,
        }
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Workers
    // -------------------------------------------------------------------------

    pub async fn register_worker(
        &self,
        worker_id: &str,
        worker_type: &str,
        capabilities: BTreeSet<Capability>,
    ) -> Result<()> {
        self.registry
            .write()
            .await
            .register(worker_id, worker_type, capabilities)
    }

    pub async fn heartbeat(&self, worker_id: &str) -> Result<()> {
        let alive = self
            .registry
            .write()
            .await
            .heartbeat(worker_id, Utc::now())?;
        if !alive {
            tracing::warn!(worker_id, "Heartbeat from offline worker ignored, re-register to revive");
        }
        Ok(())
    }

    /// Channel for [`HeartbeatSender`](crate::worker::HeartbeatSender)s. It is
    /// drained by the control loop.
    pub fn heartbeat_sender(&self) -> mpsc::Sender<String> {
        self.heartbeat_tx.clone()
    }

    pub async fn worker(&self, worker_id: &str) -> Option<Worker> {
        self.registry.read().await.get(worker_id).cloned()
    }

    // -------------------------------------------------------------------------
    // Submission
    // -------------------------------------------------------------------------

    /// Queue a task and return its id. Placement happens on a later loop
    /// iteration.
    pub async fn submit_task(
        &self,
        target_address: &str,
        parameters: TaskParameters,
        priority: i32,
    ) -> Result<String> {
        let target = target_address.trim();
        if target.is_empty() {
            return Err(SwarmError::InvalidTarget(target_address.to_string()));
        }

        let task = Task::new(target.to_string(), parameters, priority);
        let task_id = task.id.clone();
        let task_type = task.task_type();

        let mut queue = self.queue.write().await;
        if !queue.add_task(task) {
            tracing::warn!(task_type = %task_type, target_address = target, "Task queue at capacity, submission refused");
            return Err(SwarmError::QueueFull(queue.capacity()));
        }

        tracing::info!(task_id = %task_id, task_type = %task_type, target_address = target, priority, "Task submitted");
        Ok(task_id)
    }

    /// Submit with a task type name and free-form parameters. Unknown task
    /// types are refused instead of being queued forever.
    pub async fn submit_raw(
        &self,
        task_type: &str,
        target_address: &str,
        parameters: serde_json::Value,
        priority: i32,
    ) -> Result<String> {
        let parameters = TaskParameters::from_request(task_type, parameters)?;
        self.submit_task(target_address, parameters, priority).await
    }

    /// Full wallet risk evaluation (token and transaction heuristics combined).
    pub async fn submit_wallet_analysis_task(&self, address: &str, priority: i32) -> Result<String> {
        self.submit_task(
            address,
            TaskParameters::default_for(TaskType::ComprehensiveAnalysis),
            priority,
        )
        .await
    }

    pub async fn submit_token_analysis_task(&self, address: &str, priority: i32) -> Result<String> {
        self.submit_task(
            address,
            TaskParameters::default_for(TaskType::TokenAnalysis),
            priority,
        )
        .await
    }

    pub async fn submit_transaction_analysis_task(
        &self,
        address: &str,
        priority: i32,
    ) -> Result<String> {
        self.submit_task(
            address,
            TaskParameters::default_for(TaskType::TransactionAnalysis),
            priority,
        )
        .await
    }

    // -------------------------------------------------------------------------
    // Status
    // -------------------------------------------------------------------------

    /// Look a task up in the completed store, the failed store, then the live
    /// queue. `None` if it is in none of them (never submitted, or evicted).
    pub async fn get_task_status(&self, task_id: &str) -> Option<TaskStatusReport> {
        let queue = self.queue.read().await;
        let results = self.results.read().await;

        if let Some(record) = results.find(task_id) {
            return Some(TaskStatusReport::from(record));
        }
        queue.get_task(task_id).map(TaskStatusReport::from)
    }

    pub async fn get_swarm_status(&self) -> SwarmStatus {
        let queue = self.queue.read().await;
        let registry = self.registry.read().await;
        let results = self.results.read().await;
        let performance = self.metrics.read().await.clone();

        SwarmStatus {
            total_workers: registry.len(),
            idle_workers: registry.count_by_status(WorkerStatus::Idle),
            busy_workers: registry.count_by_status(WorkerStatus::Busy),
            offline_workers: registry.count_by_status(WorkerStatus::Offline),
            pending_tasks: queue.count_by_status(TaskStatus::Pending),
            assigned_tasks: queue.count_by_status(TaskStatus::Assigned),
            running_tasks: queue.count_by_status(TaskStatus::Running),
            completed_tasks: results.completed.len(),
            failed_tasks: results.failed.len(),
            performance,
            workers: registry.all_workers().to_vec(),
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
        }
    }

    /// Aggregate metrics as of the last loop iteration.
    pub async fn metrics(&self) -> SwarmMetrics {
        self.metrics.read().await.clone()
    }

    /// Poll until the task is terminal or `timeout` elapses.
    pub async fn wait_for_completion(
        &self,
        task_id: &str,
        timeout: Duration,
    ) -> Result<WaitOutcome> {
        let deadline = tokio::time::Instant::now() + timeout;
        let poll = self.config.poll_interval();

        loop {
            let report = self
                .get_task_status(task_id)
                .await
                .ok_or_else(|| SwarmError::TaskNotFound(task_id.to_string()))?;
            if report.status.is_terminal() {
                return Ok(WaitOutcome::Finished(report));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                tracing::debug!(task_id, status = %report.status, "Wait timed out, task still in progress");
                return Ok(WaitOutcome::StillRunning(report));
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }
}
