use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scheduler::queue::TaskQueue;
use crate::scheduler::task::{TaskParameters, TaskType};
use crate::worker::registry::WorkerRegistry;

/// What a worker is able to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    TokenAnalysis,
    TransactionAnalysis,
    RiskAssessment,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::TokenAnalysis => write!(f, "token_analysis"),
            Capability::TransactionAnalysis => write!(f, "transaction_analysis"),
            Capability::RiskAssessment => write!(f, "risk_assessment"),
        }
    }
}

/// Static mapping from task type to the capabilities a worker needs.
pub fn required_capabilities(task_type: TaskType) -> BTreeSet<Capability> {
    match task_type {
        TaskType::TokenAnalysis => BTreeSet::from([Capability::TokenAnalysis]),
        TaskType::TransactionAnalysis => BTreeSet::from([Capability::TransactionAnalysis]),
        TaskType::ComprehensiveAnalysis => BTreeSet::from([
            Capability::TokenAnalysis,
            Capability::TransactionAnalysis,
            Capability::RiskAssessment,
        ]),
    }
}

/// A task placed on a worker, ready for an execution unit.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub task_id: String,
    pub worker_id: String,
    pub target_address: String,
    pub parameters: TaskParameters,
}

/// Greedy placement of pending tasks onto idle workers.
///
/// Pending tasks are visited in priority order. Each one goes to the idle
/// worker with the highest success rate among those whose capabilities cover
/// the task's requirement; the first registered worker wins ties. Workers
/// whose heartbeat is older than `heartbeat_timeout` are never chosen. Tasks
/// with no candidate stay pending for a later pass. Strong workers can starve
/// weak ones, which is acceptable for small pools.
#[derive(Debug, Clone, Copy)]
pub struct TaskAssigner {
    heartbeat_timeout: Duration,
}

impl Default for TaskAssigner {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl TaskAssigner {
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self { heartbeat_timeout }
    }

    /// Run one placement pass. `on_assign` is called for every placement as
    /// soon as the task is assigned and the worker marked busy. Returns the
    /// number of tasks placed.
    pub fn assign_pending<F>(
        &self,
        queue: &mut TaskQueue,
        registry: &mut WorkerRegistry,
        mut on_assign: F,
    ) -> Result<usize>
    where
        F: FnMut(Assignment),
    {
        let pending: Vec<(String, TaskType)> = queue
            .pending_tasks()
            .into_iter()
            .map(|t| (t.id.clone(), t.task_type()))
            .collect();

        let now = Utc::now();
        let mut placed = 0;
        for (task_id, task_type) in pending {
            let required = required_capabilities(task_type);
            let Some(worker_id) = registry
                .select_candidate(&required, now, self.heartbeat_timeout)
                .map(|w| w.id.clone())
            else {
                tracing::debug!(task_id = %task_id, task_type = %task_type, "No idle worker with required capabilities");
                continue;
            };

            registry.mark_busy(&worker_id, &task_id)?;
            if let Err(e) = queue.assign_task(&task_id, &worker_id) {
                registry.release(&worker_id, &task_id, None);
                return Err(e);
            }

            let Some(task) = queue.get_task(&task_id) else {
                continue;
            };
            tracing::info!(task_id = %task_id, worker_id = %worker_id, priority = task.priority, "Task assigned");
            let assignment = Assignment {
                target_address: task.target_address.clone(),
                parameters: task.parameters.clone(),
                task_id,
                worker_id,
            };
            on_assign(assignment);
            placed += 1;
        }

        Ok(placed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comprehensive_needs_every_capability() {
        let required = required_capabilities(TaskType::ComprehensiveAnalysis);
        assert_eq!(required.len(), 3);
        assert!(required.contains(&Capability::RiskAssessment));
        assert_eq!(
            required_capabilities(TaskType::TokenAnalysis),
            BTreeSet::from([Capability::TokenAnalysis])
        );
    }

    #[test]
    fn capability_display_matches_serde() {
        for cap in [
            Capability::TokenAnalysis,
            Capability::TransactionAnalysis,
            Capability::RiskAssessment,
        ] {
            let json = serde_json::to_value(cap).unwrap();
            assert_eq!(json, serde_json::Value::String(cap.to_string()));
        }
    }
}
