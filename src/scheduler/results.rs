use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::AnalysisReport;
use crate::scheduler::task::Task;

pub const DEFAULT_COMPLETED_RETENTION: usize = 100;
pub const DEFAULT_FAILED_RETENTION: usize = 50;

/// A terminal task together with its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task: Task,
    pub result: Option<AnalysisReport>,
    pub error: Option<String>,
    /// Run time of the analysis call. `None` when the task never finished a
    /// run (its worker went offline first).
    pub duration_ms: Option<u64>,
}

impl TaskRecord {
    pub fn completed(task: Task, result: AnalysisReport, duration: Duration) -> Self {
        Self {
            task,
            result: Some(result),
            error: None,
            duration_ms: Some(duration.as_millis() as u64),
        }
    }

    pub fn failed(task: Task, error: String, duration: Option<Duration>) -> Self {
        Self {
            task,
            result: None,
            error: Some(error),
            duration_ms: duration.map(|d| d.as_millis() as u64),
        }
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.task.completed_at.unwrap_or(self.task.created_at)
    }
}

/// Bounded store of terminal tasks, ordered by completion time. Growth past
/// the retention limit is allowed until [`ResultStore::trim`] runs.
#[derive(Debug)]
pub struct ResultStore {
    records: VecDeque<TaskRecord>,
    retention: usize,
}

impl ResultStore {
    pub fn new(retention: usize) -> Self {
        Self {
            records: VecDeque::new(),
            retention,
        }
    }

    pub fn insert(&mut self, record: TaskRecord) {
        let at = record.completed_at();
        let pos = self.records.partition_point(|r| r.completed_at() <= at);
        self.records.insert(pos, record);
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskRecord> {
        self.records.iter().find(|r| r.task.id == task_id)
    }

    /// Evict the oldest records beyond the retention limit. Returns the
    /// number evicted.
    pub fn trim(&mut self) -> usize {
        let excess = self.records.len().saturating_sub(self.retention);
        self.records.drain(..excess);
        excess
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn retention(&self) -> usize {
        self.retention
    }
}

/// Aggregate performance over the retained results.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SwarmMetrics {
    pub tasks_processed: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub success_rate: f64,
    pub average_completion_time_ms: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct ResultStores {
    pub completed: ResultStore,
    pub failed: ResultStore,
}

impl Default for ResultStores {
    fn default() -> Self {
        Self::new(DEFAULT_COMPLETED_RETENTION, DEFAULT_FAILED_RETENTION)
    }
}

impl ResultStores {
    pub fn new(completed_retention: usize, failed_retention: usize) -> Self {
        Self {
            completed: ResultStore::new(completed_retention),
            failed: ResultStore::new(failed_retention),
        }
    }

    /// Completed store first, then failed.
    pub fn find(&self, task_id: &str) -> Option<&TaskRecord> {
        self.completed
            .get(task_id)
            .or_else(|| self.failed.get(task_id))
    }

    pub fn trim(&mut self) -> (usize, usize) {
        (self.completed.trim(), self.failed.trim())
    }

    pub fn metrics(&self, now: DateTime<Utc>) -> SwarmMetrics {
        let tasks_completed = self.completed.len();
        let tasks_failed = self.failed.len();
        let tasks_processed = tasks_completed + tasks_failed;

        let durations: Vec<u64> = self
            .completed
            .iter()
            .chain(self.failed.iter())
            .filter_map(|r| r.duration_ms)
            .collect();
        let average_completion_time_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<u64>() as f64 / durations.len() as f64
        };

        SwarmMetrics {
            tasks_processed,
            tasks_completed,
            tasks_failed,
            success_rate: if tasks_processed == 0 {
                0.0
            } else {
                tasks_completed as f64 / tasks_processed as f64
            },
            average_completion_time_ms,
            last_updated: Some(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{TaskParameters, TaskType};
    use chrono::Duration as ChronoDuration;

    fn finished_task(offset_secs: i64) -> Task {
        let mut task = Task::new(
            "0xabc".to_string(),
            TaskParameters::default_for(TaskType::TokenAnalysis),
            0,
        );
        let base = Utc::now();
        task.assign("w1").unwrap();
        task.start(base).unwrap();
        task.complete(base + ChronoDuration::seconds(offset_secs))
            .unwrap();
        task
    }

    fn report() -> AnalysisReport {
        AnalysisReport::new("test", "0xabc", 10.0)
    }

    #[test]
    fn trim_evicts_oldest_by_completion_time() {
        let mut store = ResultStore::new(2);
        let newest = finished_task(30);
        let oldest = finished_task(10);
        let middle = finished_task(20);
        let oldest_id = oldest.id.clone();

        // out-of-order insertion still keeps completion order
        store.insert(TaskRecord::completed(newest, report(), Duration::from_millis(5)));
        store.insert(TaskRecord::completed(oldest, report(), Duration::from_millis(5)));
        store.insert(TaskRecord::completed(middle, report(), Duration::from_millis(5)));
        assert_eq!(store.len(), 3);

        assert_eq!(store.trim(), 1);
        assert_eq!(store.len(), 2);
        assert!(store.get(&oldest_id).is_none());
        assert_eq!(store.trim(), 0);
    }

    #[test]
    fn find_checks_completed_then_failed() {
        let mut stores = ResultStores::new(10, 10);
        let task = finished_task(1);
        let id = task.id.clone();
        stores
            .failed
            .insert(TaskRecord::failed(task.clone(), "boom".to_string(), None));
        stores
            .completed
            .insert(TaskRecord::completed(task, report(), Duration::from_millis(1)));

        let found = stores.find(&id).unwrap();
        assert!(found.result.is_some());
        assert!(stores.find("missing").is_none());
    }

    #[test]
    fn metrics_over_retained_results() {
        let mut stores = ResultStores::default();
        assert_eq!(stores.metrics(Utc::now()).success_rate, 0.0);

        stores.completed.insert(TaskRecord::completed(
            finished_task(1),
            report(),
            Duration::from_millis(100),
        ));
        stores.completed.insert(TaskRecord::completed(
            finished_task(2),
            report(),
            Duration::from_millis(300),
        ));
        stores.failed.insert(TaskRecord::failed(
            finished_task(3),
            "worker offline".to_string(),
            None,
        ));

        let metrics = stores.metrics(Utc::now());
        assert_eq!(metrics.tasks_processed, 3);
        assert_eq!(metrics.tasks_completed, 2);
        assert_eq!(metrics.tasks_failed, 1);
        assert!((metrics.success_rate - 2.0 / 3.0).abs() < 1e-9);
        // the force-failed record has no duration and is excluded
        assert_eq!(metrics.average_completion_time_ms, 200.0);
    }
}
