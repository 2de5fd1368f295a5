use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::scheduler::{Assignment, ResultStores, TaskQueue, TaskRecord, TaskStatus};
use crate::worker::{ExecutionResult, TaskExecutor, WorkerRegistry};

/// Runs one assigned task on its worker.
///
/// Shared state is touched at exactly two points: when the run starts
/// (task becomes running) and when it ends (outcome recorded, worker freed).
/// Between them the unit only awaits the analysis call.
pub(super) struct ExecutionUnit {
    pub queue: Arc<RwLock<TaskQueue>>,
    pub registry: Arc<RwLock<WorkerRegistry>>,
    pub results: Arc<RwLock<ResultStores>>,
    pub executor: TaskExecutor,
    pub assignment: Assignment,
}

impl ExecutionUnit {
    pub async fn run(self) {
        if !self.begin().await {
            return;
        }

        let a = &self.assignment;
        let result = self
            .executor
            .execute(&a.task_id, &a.target_address, &a.parameters)
            .await;

        self.finish(result).await;
    }

    async fn begin(&self) -> bool {
        let Assignment {
            task_id, worker_id, ..
        } = &self.assignment;
        let now = Utc::now();

        let mut queue = self.queue.write().await;
        let mut registry = self.registry.write().await;

        if let Err(e) = queue.start_task(task_id, now) {
            // the health monitor got here first
            tracing::warn!(task_id = %task_id, worker_id = %worker_id, error = %e, "Task cannot start, abandoning run");
            registry.release(worker_id, task_id, None);
            return false;
        }
        if let Err(e) = registry.heartbeat(worker_id, now) {
            tracing::warn!(worker_id = %worker_id, error = %e, "Heartbeat at task start failed");
        }

        tracing::debug!(task_id = %task_id, worker_id = %worker_id, "Task running");
        true
    }

    async fn finish(&self, result: ExecutionResult) {
        let Assignment {
            task_id, worker_id, ..
        } = &self.assignment;
        let now = Utc::now();

        let mut queue = self.queue.write().await;
        let mut registry = self.registry.write().await;
        let mut results = self.results.write().await;

        let still_ours = queue.get_task(task_id).is_some_and(|t| {
            t.status == TaskStatus::Running && t.assigned_worker.as_deref() == Some(worker_id.as_str())
        });
        if !still_ours {
            tracing::warn!(
                task_id = %task_id,
                worker_id = %worker_id,
                outcome = %result.status,
                "Discarding result for task that was failed while running"
            );
            return;
        }

        let success = result.status == TaskStatus::Completed;
        let recorded = match result.report {
            Some(report) if success => queue.complete_task(task_id, now).map(|task| {
                results
                    .completed
                    .insert(TaskRecord::completed(task, report, result.duration))
            }),
            _ => {
                let error = result
                    .error
                    .unwrap_or_else(|| "analysis returned no result".to_string());
                queue.fail_task(task_id, now).map(|task| {
                    results
                        .failed
                        .insert(TaskRecord::failed(task, error, Some(result.duration)))
                })
            }
        };
        if let Err(e) = recorded {
            tracing::error!(task_id = %task_id, error = %e, "Failed to record task outcome");
        }

        registry.release(worker_id, task_id, Some((result.duration, success)));
        if let Err(e) = registry.heartbeat(worker_id, now) {
            tracing::warn!(worker_id = %worker_id, error = %e, "Heartbeat at task end failed");
        }

        tracing::info!(
            task_id = %task_id,
            worker_id = %worker_id,
            success,
            duration_ms = result.duration.as_millis() as u64,
            "Task finished, worker released"
        );
    }
}
