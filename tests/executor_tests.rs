
use std::sync::Arc;

use riskswarm::analysis::{AnalysisSuite, RiskLevel};
use riskswarm::scheduler::{TaskParameters, TaskStatus, TaskType};
use riskswarm::worker::TaskExecutor;
use test_harness::{FailingAnalyzer, PanickingAnalyzer};

const EVM_ADDRESS: &str = "0x52908400098527886e0f7030069857d2e4169ee7";

/// Executor backed by the built-in heuristics
fn heuristic_executor() -> TaskExecutor {
    TaskExecutor::new(AnalysisSuite::heuristic())
}

#[tokio::test]
async fn test_execute_token_analysis() {
    let executor = heuristic_executor();
    let params = TaskParameters::default_for(TaskType::TokenAnalysis);

    let result = executor.execute("t1", EVM_ADDRESS, &params).await;

    assert_eq!(result.task_id, "t1");
    assert_eq!(result.status, TaskStatus::Completed);
    assert!(result.error.is_none());
    let report = result.report.unwrap();
    assert_eq!(report.analysis, "token-heuristics");
    assert_eq!(report.risk_level, RiskLevel::Low);
}

#[tokio::test]
async fn test_execute_comprehensive_uses_risk_evaluation() {
    let executor = heuristic_executor();
    let params = TaskParameters::default_for(TaskType::ComprehensiveAnalysis);

    let result = executor.execute("t2", EVM_ADDRESS, &params).await;

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.report.unwrap().analysis, "risk-heuristics");
}

#[tokio::test]
async fn test_execute_invalid_address_fails() {
    let executor = heuristic_executor();
    let params = TaskParameters::default_for(TaskType::TransactionAnalysis);

    let result = executor.execute("t3", "not-an-address", &params).await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert!(result.report.is_none());
    assert!(result.error.unwrap().contains("unrecognised address format"));
}

#[tokio::test]
async fn test_execute_error_is_recorded_verbatim() {
    let executor = TaskExecutor::new(AnalysisSuite::uniform(Arc::new(FailingAnalyzer(
        "rate limited",
    ))));
    let params = TaskParameters::default_for(TaskType::TokenAnalysis);

    let result = executor.execute("t4", EVM_ADDRESS, &params).await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.error.as_deref(), Some("analysis failed: rate limited"));
}

#[tokio::test]
async fn test_execute_panic_becomes_failure() {
    let executor = TaskExecutor::new(AnalysisSuite::uniform(Arc::new(PanickingAnalyzer)));
    let params = TaskParameters::default_for(TaskType::TokenAnalysis);

    let result = executor.execute("t5", EVM_ADDRESS, &params).await;

    assert_eq!(result.status, TaskStatus::Failed);
    let error = result.error.unwrap();
    assert!(error.starts_with("analysis panicked"));
    assert!(error.contains("rpc node exploded"));
}
