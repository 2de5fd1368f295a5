use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Result, SwarmError};
use crate::scheduler::assigner::Capability;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Offline,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerStatus::Idle => write!(f, "idle"),
            WorkerStatus::Busy => write!(f, "busy"),
            WorkerStatus::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    /// Finished runs, successful or not.
    pub tasks_completed: u64,
    pub total_time_ms: u64,
    pub successful_tasks: u64,
    pub average_duration_ms: f64,
    pub success_rate: f64,
}

impl PerformanceMetrics {
    pub fn record(&mut self, duration: Duration, success: bool) {
        self.tasks_completed += 1;
        self.total_time_ms += duration.as_millis() as u64;
        if success {
            self.successful_tasks += 1;
        }
        self.average_duration_ms = self.total_time_ms as f64 / self.tasks_completed as f64;
        self.success_rate = self.successful_tasks as f64 / self.tasks_completed as f64;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Worker {
    pub id: String,
    pub worker_type: String,
    pub capabilities: BTreeSet<Capability>,
    pub status: WorkerStatus,
    pub current_task: Option<String>,
    pub last_heartbeat: DateTime<Utc>,
    pub metrics: PerformanceMetrics,
}

impl Worker {
    pub fn new(id: String, worker_type: String, capabilities: BTreeSet<Capability>) -> Self {
        Self {
            id,
            worker_type,
            capabilities,
            status: WorkerStatus::Idle,
            current_task: None,
            last_heartbeat: Utc::now(),
            metrics: PerformanceMetrics::default(),
        }
    }

    pub fn supports(&self, required: &BTreeSet<Capability>) -> bool {
        required.is_subset(&self.capabilities)
    }

    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        match (now - self.last_heartbeat).to_std() {
            Ok(elapsed) => elapsed > timeout,
            // heartbeat in the future
            Err(_) => false,
        }
    }
}

/// Workers in registration order. Registration order is what breaks ties
/// during selection.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: Vec<Worker>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker, or re-register an existing one.
    ///
    /// Re-registration replaces capabilities and refreshes the heartbeat. An
    /// offline worker comes back idle with its metrics intact. A busy worker
    /// cannot be re-registered.
    pub fn register(
        &mut self,
        id: &str,
        worker_type: &str,
        capabilities: BTreeSet<Capability>,
    ) -> Result<()> {
        match self.workers.iter_mut().find(|w| w.id == id) {
            Some(worker) if worker.status == WorkerStatus::Busy => {
                Err(SwarmError::WorkerBusy(id.to_string()))
            }
            Some(worker) => {
                let was_offline = worker.status == WorkerStatus::Offline;
                worker.worker_type = worker_type.to_string();
                worker.capabilities = capabilities;
                worker.status = WorkerStatus::Idle;
                worker.current_task = None;
                worker.last_heartbeat = Utc::now();
                tracing::info!(worker_id = id, was_offline, "Worker re-registered");
                Ok(())
            }
            None => {
                self.workers.push(Worker::new(
                    id.to_string(),
                    worker_type.to_string(),
                    capabilities,
                ));
                tracing::info!(worker_id = id, worker_type, "Worker registered");
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Worker> {
        self.workers.iter().find(|w| w.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Worker> {
        self.workers
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| SwarmError::WorkerNotFound(id.to_string()))
    }

    pub fn all_workers(&self) -> &[Worker] {
        &self.workers
    }

    /// Refresh a worker's heartbeat. Offline workers must re-register instead;
    /// returns false for them.
    pub fn heartbeat(&mut self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let worker = self.get_mut(id)?;
        if worker.status == WorkerStatus::Offline {
            return Ok(false);
        }
        worker.last_heartbeat = at;
        Ok(true)
    }

    /// Idle worker covering `required` with the best success rate; earliest
    /// registered on ties. Workers whose heartbeat is older than `timeout` are
    /// skipped, since the health monitor is about to take them offline.
    pub fn select_candidate(
        &self,
        required: &BTreeSet<Capability>,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Option<&Worker> {
        let mut best: Option<&Worker> = None;
        for worker in self.workers.iter().filter(|w| {
            w.status == WorkerStatus::Idle && w.supports(required) && !w.is_stale(now, timeout)
        }) {
            match best {
                Some(b) if b.metrics.success_rate >= worker.metrics.success_rate => {}
                _ => best = Some(worker),
            }
        }
        best
    }

    pub fn mark_busy(&mut self, id: &str, task_id: &str) -> Result<()> {
        let worker = self.get_mut(id)?;
        if worker.status != WorkerStatus::Idle {
            return Err(SwarmError::WorkerBusy(id.to_string()));
        }
        worker.status = WorkerStatus::Busy;
        worker.current_task = Some(task_id.to_string());
        Ok(())
    }

    /// Free a busy worker from `task_id`, recording the run if one happened.
    /// Does nothing unless the worker is busy with exactly that task, so a
    /// worker already taken offline stays offline.
    pub fn release(&mut self, id: &str, task_id: &str, run: Option<(Duration, bool)>) -> bool {
        let Ok(worker) = self.get_mut(id) else {
            return false;
        };
        if worker.status != WorkerStatus::Busy || worker.current_task.as_deref() != Some(task_id) {
            return false;
        }
        if let Some((duration, success)) = run {
            worker.metrics.record(duration, success);
        }
        worker.status = WorkerStatus::Idle;
        worker.current_task = None;
        true
    }

    /// Live workers whose heartbeat is older than `timeout`.
    pub fn stale_workers(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<String> {
        self.workers
            .iter()
            .filter(|w| w.status != WorkerStatus::Offline && w.is_stale(now, timeout))
            .map(|w| w.id.clone())
            .collect()
    }

    /// Take a worker offline. Returns the task it was running, if any.
    pub fn mark_offline(&mut self, id: &str) -> Result<Option<String>> {
        let worker = self.get_mut(id)?;
        worker.status = WorkerStatus::Offline;
        Ok(worker.current_task.take())
    }

    pub fn count_by_status(&self, status: WorkerStatus) -> usize {
        self.workers.iter().filter(|w| w.status == status).count()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
