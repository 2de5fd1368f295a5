//! Address risk analysis functions invoked by the execution units.
//!
//! The coordinator treats every analysis as opaque: it hands over the target
//! address and the task's typed parameters, then records whatever comes back.
//! Three functions are selected by task type:
//!
//! - **token analysis** for [`TaskType::TokenAnalysis`]
//! - **transaction analysis** for [`TaskType::TransactionAnalysis`]
//! - **aggregate risk evaluation** for [`TaskType::ComprehensiveAnalysis`]
//!
//! No retries or timeouts are assumed from implementations. The
//! [`heuristics`] module provides offline defaults so the service runs
//! without chain data access.

pub mod heuristics;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::{TaskParameters, TaskType};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("unrecognised address format: {0:?}")]
    InvalidAddress(String),

    #[error("{analysis} does not support {task_type} tasks")]
    Unsupported {
        analysis: &'static str,
        task_type: TaskType,
    },

    #[error("analysis failed: {0}")]
    Failed(String),

    #[error("analysis panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            RiskLevel::Critical
        } else if score >= 50.0 {
            RiskLevel::High
        } else if score >= 20.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Structured outcome of a successful analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Which analysis produced the report (e.g. "token-heuristics").
    pub analysis: String,
    pub target_address: String,
    /// 0 (clean) to 100 (certainly malicious).
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub signals: Vec<String>,
    pub details: serde_json::Value,
}

impl AnalysisReport {
    pub fn new(analysis: &str, target_address: &str, risk_score: f64) -> Self {
        let risk_score = risk_score.clamp(0.0, 100.0);
        Self {
            analysis: analysis.to_string(),
            target_address: target_address.to_string(),
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
            signals: Vec::new(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_signals(mut self, signals: Vec<String>) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn analyze(
        &self,
        target_address: &str,
        parameters: &TaskParameters,
    ) -> Result<AnalysisReport, AnalysisError>;
}

/// The three analysis functions, selected by task type.
#[derive(Clone)]
pub struct AnalysisSuite {
    pub token: Arc<dyn Analyzer>,
    pub transaction: Arc<dyn Analyzer>,
    pub risk: Arc<dyn Analyzer>,
}

impl AnalysisSuite {
    pub fn new(
        token: Arc<dyn Analyzer>,
        transaction: Arc<dyn Analyzer>,
        risk: Arc<dyn Analyzer>,
    ) -> Self {
        Self {
            token,
            transaction,
            risk,
        }
    }

    /// Use a single analyzer for every task type.
    pub fn uniform(analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            token: analyzer.clone(),
            transaction: analyzer.clone(),
            risk: analyzer,
        }
    }

    pub fn heuristic() -> Self {
        Self {
            token: Arc::new(heuristics::TokenHeuristics),
            transaction: Arc::new(heuristics::TransactionHeuristics),
            risk: Arc::new(heuristics::RiskHeuristics),
        }
    }

    pub fn for_task(&self, task_type: TaskType) -> Arc<dyn Analyzer> {
        match task_type {
            TaskType::TokenAnalysis => self.token.clone(),
            TaskType::TransactionAnalysis => self.transaction.clone(),
            TaskType::ComprehensiveAnalysis => self.risk.clone(),
        }
    }
}

impl std::fmt::Debug for AnalysisSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisSuite")
            .field("token", &self.token.name())
            .field("transaction", &self.transaction.name())
            .field("risk", &self.risk.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_thresholds() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(19.9), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(20.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(50.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(95.0), RiskLevel::Critical);
    }

    #[test]
    fn report_score_is_clamped() {
        let report = AnalysisReport::new("test", "0xabc", 140.0);
        assert_eq!(report.risk_score, 100.0);
        assert_eq!(report.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn suite_selects_analyzer_by_task_type() {
        let suite = AnalysisSuite::heuristic();
        assert_eq!(
            suite.for_task(TaskType::TokenAnalysis).name(),
            "token-heuristics"
        );
        assert_eq!(
            suite.for_task(TaskType::TransactionAnalysis).name(),
            "transaction-heuristics"
        );
        assert_eq!(
            suite.for_task(TaskType::ComprehensiveAnalysis).name(),
            "risk-heuristics"
        );
    }
}
