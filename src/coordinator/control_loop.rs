use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::execution::ExecutionUnit;
use super::SwarmCoordinator;
use crate::error::{Result, SwarmError};
use crate::scheduler::{Assignment, TaskQueue, TaskRecord};
use crate::worker::{WorkerRegistry, WorkerStatus};

impl SwarmCoordinator {
    /// Run the control loop until `shutdown` is cancelled.
    ///
    /// Each iteration (see [`tick`](Self::tick)) is followed by the configured
    /// loop interval, or by the error backoff if the iteration failed.
    /// Heartbeats arriving on the heartbeat channel are applied between
    /// iterations. Execution units already in flight are left to finish.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut heartbeats = self.heartbeat_rx.lock().await.take();
        if heartbeats.is_none() {
            tracing::warn!("Heartbeat channel already claimed by another loop");
        }

        tracing::info!(
            loop_interval_ms = self.config.loop_interval_ms,
            heartbeat_timeout_ms = self.config.heartbeat_timeout_ms,
            "Coordinator loop started"
        );

        let mut next_tick = Instant::now();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Coordinator loop stopping");
                    break;
                }

                Some(worker_id) = next_heartbeat(&mut heartbeats) => {
                    if let Err(e) = self.heartbeat(&worker_id).await {
                        tracing::warn!(worker_id = %worker_id, error = %e, "Heartbeat rejected");
                    }
                }

                _ = tokio::time::sleep_until(next_tick) => {
                    let delay = match self.tick().await {
                        Ok(()) => self.config.loop_interval(),
                        Err(e) => {
                            tracing::error!(error = %e, "Coordinator iteration failed, backing off");
                            self.config.error_backoff()
                        }
                    };
                    next_tick = Instant::now() + delay;
                }
            }
        }
    }

    /// One loop iteration: assign, monitor health, verify, recompute metrics,
    /// clean up.
    pub async fn tick(&self) -> Result<()> {
        let assigned = self.assign_pending_tasks().await?;
        let offline = self.monitor_worker_health().await?;
        self.verify_assignments().await?;
        self.update_metrics().await;
        let (evicted, removed) = self.cleanup().await;

        tracing::debug!(assigned, offline, evicted, removed, "Coordinator iteration complete");
        Ok(())
    }

    /// Place pending tasks on idle workers and spawn an execution unit for
    /// each placement.
    async fn assign_pending_tasks(&self) -> Result<usize> {
        let mut queue = self.queue.write().await;
        let mut registry = self.registry.write().await;
        self.assigner
            .assign_pending(&mut queue, &mut registry, |assignment| {
                self.spawn_execution_unit(assignment)
            })
    }

    fn spawn_execution_unit(&self, assignment: Assignment) {
        let unit = ExecutionUnit {
            queue: self.queue.clone(),
            registry: self.registry.clone(),
            results: self.results.clone(),
            executor: self.executor.clone(),
            assignment,
        };
        tokio::spawn(unit.run());
    }

    /// Take workers with stale heartbeats offline and fail whatever they were
    /// running. Returns how many went offline.
    async fn monitor_worker_health(&self) -> Result<usize> {
        let now = Utc::now();
        let timeout = self.config.heartbeat_timeout();

        let mut queue = self.queue.write().await;
        let mut registry = self.registry.write().await;
        let mut results = self.results.write().await;

        let stale = registry.stale_workers(now, timeout);
        for worker_id in &stale {
            let abandoned = registry.mark_offline(worker_id)?;
            tracing::warn!(worker_id = %worker_id, "Worker heartbeat stale, marked offline");

            let Some(task_id) = abandoned else {
                continue;
            };
            let task = queue.fail_task(&task_id, now)?;
            tracing::warn!(task_id = %task_id, worker_id = %worker_id, "In-flight task failed, worker went offline");
            results.failed.insert(TaskRecord::failed(
                task,
                format!(
                    "worker {} went offline: no heartbeat for over {}ms",
                    worker_id,
                    timeout.as_millis()
                ),
                None,
            ));
        }

        Ok(stale.len())
    }

    /// Check that busy workers and in-flight tasks pair up one to one.
    pub async fn verify_assignments(&self) -> Result<()> {
        let queue = self.queue.read().await;
        let registry = self.registry.read().await;
        check_assignment_bijection(&queue, &registry)
    }

    async fn update_metrics(&self) {
        let metrics = self.results.read().await.metrics(Utc::now());
        *self.metrics.write().await = metrics;
    }

    /// Trim result stores and drop terminal tasks from the live queue.
    async fn cleanup(&self) -> (usize, usize) {
        let mut queue = self.queue.write().await;
        let mut results = self.results.write().await;

        let (completed, failed) = results.trim();
        let removed = queue.cleanup_finished_tasks();
        (completed + failed, removed)
    }
}

async fn next_heartbeat(rx: &mut Option<mpsc::Receiver<String>>) -> Option<String> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

pub(crate) fn check_assignment_bijection(
    queue: &TaskQueue,
    registry: &WorkerRegistry,
) -> Result<()> {
    for worker in registry.all_workers() {
        if worker.status != WorkerStatus::Busy {
            continue;
        }
        let Some(task_id) = worker.current_task.as_deref() else {
            return Err(SwarmError::Internal(format!(
                "busy worker {} has no current task",
                worker.id
            )));
        };
        let paired = queue.get_task(task_id).is_some_and(|t| {
            t.status.is_in_flight() && t.assigned_worker.as_deref() == Some(worker.id.as_str())
        });
        if !paired {
            return Err(SwarmError::Internal(format!(
                "busy worker {} points at task {} which is not in flight on it",
                worker.id, task_id
            )));
        }
    }

    for task in queue.all_tasks() {
        if !task.status.is_in_flight() {
            continue;
        }
        let paired = task
            .assigned_worker
            .as_deref()
            .and_then(|id| registry.get(id))
            .is_some_and(|w| {
                w.status == WorkerStatus::Busy && w.current_task.as_deref() == Some(task.id.as_str())
            });
        if !paired {
            return Err(SwarmError::Internal(format!(
                "{} task {} is not held by a busy worker",
                task.status, task.id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Capability, Task, TaskParameters, TaskType};
    use std::collections::BTreeSet;

    fn setup() -> (TaskQueue, WorkerRegistry, String) {
        let mut queue = TaskQueue::new();
        let mut registry = WorkerRegistry::new();
        registry
            .register("w", "token", BTreeSet::from([Capability::TokenAnalysis]))
            .unwrap();
        let task = Task::new(
            "0xabc".to_string(),
            TaskParameters::default_for(TaskType::TokenAnalysis),
            0,
        );
        let id = task.id.clone();
        queue.add_task(task);
        (queue, registry, id)
    }

    #[test]
    fn bijection_holds_for_consistent_state() {
        let (mut queue, mut registry, id) = setup();
        check_assignment_bijection(&queue, &registry).unwrap();

        registry.mark_busy("w", &id).unwrap();
        queue.assign_task(&id, "w").unwrap();
        check_assignment_bijection(&queue, &registry).unwrap();
    }

    #[test]
    fn bijection_detects_orphaned_task() {
        let (mut queue, registry, id) = setup();
        queue.assign_task(&id, "w").unwrap();
        assert!(matches!(
            check_assignment_bijection(&queue, &registry),
            Err(SwarmError::Internal(_))
        ));
    }

    #[test]
    fn bijection_detects_worker_without_task() {
        let (queue, mut registry, _id) = setup();
        registry.mark_busy("w", "ghost").unwrap();
        assert!(matches!(
            check_assignment_bijection(&queue, &registry),
            Err(SwarmError::Internal(_))
        ));
    }
}
