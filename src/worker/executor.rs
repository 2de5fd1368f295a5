use std::time::{Duration, Instant};

use crate::analysis::{AnalysisError, AnalysisReport, AnalysisSuite};
use crate::scheduler::{TaskParameters, TaskStatus};

/// Outcome of one analysis run.
#[derive(Debug)]
pub struct ExecutionResult {
    pub task_id: String,
    pub status: TaskStatus,
    pub report: Option<AnalysisReport>,
    pub error: Option<String>,
    pub duration: Duration,
}

/// Invokes the analysis function for a task and times it.
///
/// The call runs on its own tokio task so that a panicking analyzer is
/// reported as a failed run instead of taking the caller down with it.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    analyzers: AnalysisSuite,
}

impl TaskExecutor {
    pub fn new(analyzers: AnalysisSuite) -> Self {
        Self { analyzers }
    }

    pub async fn execute(
        &self,
        task_id: &str,
        target_address: &str,
        parameters: &TaskParameters,
    ) -> ExecutionResult {
        let task_type = parameters.task_type();
        let analyzer = self.analyzers.for_task(task_type);
        tracing::info!(task_id, target_address, task_type = %task_type, analyzer = analyzer.name(), "Executing task");

        let target = target_address.to_string();
        let params = parameters.clone();
        let started = Instant::now();
        let outcome =
            tokio::spawn(async move { analyzer.analyze(&target, &params).await }).await;
        let duration = started.elapsed();

        let outcome = match outcome {
            Ok(result) => result,
            Err(join_err) => Err(AnalysisError::Panicked(panic_message(join_err))),
        };

        Self::process_outcome(task_id, outcome, duration)
    }

    fn process_outcome(
        task_id: &str,
        outcome: Result<AnalysisReport, AnalysisError>,
        duration: Duration,
    ) -> ExecutionResult {
        match outcome {
            Ok(report) => {
                tracing::info!(
                    task_id,
                    risk_score = report.risk_score,
                    duration_ms = duration.as_millis() as u64,
                    "Task analysis succeeded"
                );
                ExecutionResult {
                    task_id: task_id.to_string(),
                    status: TaskStatus::Completed,
                    report: Some(report),
                    error: None,
                    duration,
                }
            }
            Err(e) => {
                tracing::warn!(
                    task_id,
                    error = %e,
                    duration_ms = duration.as_millis() as u64,
                    "Task analysis failed"
                );
                ExecutionResult {
                    task_id: task_id.to_string(),
                    status: TaskStatus::Failed,
                    report: None,
                    error: Some(e.to_string()),
                    duration,
                }
            }
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
