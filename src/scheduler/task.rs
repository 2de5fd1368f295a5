use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SwarmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn is_in_flight(self) -> bool {
        matches!(self, TaskStatus::Assigned | TaskStatus::Running)
    }

    /// Legal edges of the task lifecycle. Nothing ever returns to `Pending`,
    /// and `Assigned -> Failed` only happens when the worker goes offline.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Assigned)
                | (TaskStatus::Assigned, TaskStatus::Running)
                | (TaskStatus::Assigned, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Assigned => write!(f, "assigned"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    TokenAnalysis,
    TransactionAnalysis,
    ComprehensiveAnalysis,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::TokenAnalysis => "token-analysis",
            TaskType::TransactionAnalysis => "transaction-analysis",
            TaskType::ComprehensiveAnalysis => "comprehensive-analysis",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "token-analysis" => Ok(TaskType::TokenAnalysis),
            "transaction-analysis" => Ok(TaskType::TransactionAnalysis),
            "comprehensive-analysis" => Ok(TaskType::ComprehensiveAnalysis),
            other => Err(SwarmError::UnknownTaskType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenAnalysisParams {
    /// Chain hint (e.g. "ethereum", "solana"). Inferred from the address when absent.
    pub chain: Option<String>,
    /// Addresses already known to be malicious.
    pub flagged_addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionAnalysisParams {
    pub chain: Option<String>,
    /// How many recent transactions the analysis should consider.
    pub lookback_limit: u32,
    pub flagged_addresses: Vec<String>,
}

impl Default for TransactionAnalysisParams {
    fn default() -> Self {
        Self {
            chain: None,
            lookback_limit: 100,
            flagged_addresses: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComprehensiveAnalysisParams {
    pub chain: Option<String>,
    pub include_token: bool,
    pub include_transactions: bool,
    pub flagged_addresses: Vec<String>,
}

impl Default for ComprehensiveAnalysisParams {
    fn default() -> Self {
        Self {
            chain: None,
            include_token: true,
            include_transactions: true,
            flagged_addresses: Vec::new(),
        }
    }
}

/// Typed parameters for each kind of analysis. The variant determines the
/// task type, so a task can never carry parameters for the wrong analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task_type", rename_all = "kebab-case")]
pub enum TaskParameters {
    TokenAnalysis(TokenAnalysisParams),
    TransactionAnalysis(TransactionAnalysisParams),
    ComprehensiveAnalysis(ComprehensiveAnalysisParams),
}

impl TaskParameters {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskParameters::TokenAnalysis(_) => TaskType::TokenAnalysis,
            TaskParameters::TransactionAnalysis(_) => TaskType::TransactionAnalysis,
            TaskParameters::ComprehensiveAnalysis(_) => TaskType::ComprehensiveAnalysis,
        }
    }

    pub fn default_for(task_type: TaskType) -> Self {
        match task_type {
            TaskType::TokenAnalysis => TaskParameters::TokenAnalysis(Default::default()),
            TaskType::TransactionAnalysis => {
                TaskParameters::TransactionAnalysis(Default::default())
            }
            TaskType::ComprehensiveAnalysis => {
                TaskParameters::ComprehensiveAnalysis(Default::default())
            }
        }
    }

    /// Build typed parameters from a free-form request. Unknown task types are
    /// rejected here rather than admitted as unassignable work.
    pub fn from_request(task_type: &str, parameters: serde_json::Value) -> Result<Self> {
        let task_type: TaskType = task_type.parse()?;

        let mut object = match parameters {
            serde_json::Value::Null => serde_json::Map::new(),
            serde_json::Value::Object(map) => map,
            other => {
                return Err(SwarmError::InvalidParameters(format!(
                    "expected a JSON object, got {}",
                    other
                )))
            }
        };
        object.insert(
            "task_type".to_string(),
            serde_json::Value::String(task_type.as_str().to_string()),
        );

        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| SwarmError::InvalidParameters(e.to_string()))
    }

    pub fn flagged_addresses(&self) -> &[String] {
        match self {
            TaskParameters::TokenAnalysis(p) => &p.flagged_addresses,
            TaskParameters::TransactionAnalysis(p) => &p.flagged_addresses,
            TaskParameters::ComprehensiveAnalysis(p) => &p.flagged_addresses,
        }
    }

    pub fn chain(&self) -> Option<&str> {
        match self {
            TaskParameters::TokenAnalysis(p) => p.chain.as_deref(),
            TaskParameters::TransactionAnalysis(p) => p.chain.as_deref(),
            TaskParameters::ComprehensiveAnalysis(p) => p.chain.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub target_address: String,
    pub parameters: TaskParameters,
    /// Higher runs sooner.
    pub priority: i32,
    /// Submission order, used to keep equal priorities first-come first-served.
    pub sequence: u64,
    pub status: TaskStatus,
    pub assigned_worker: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(target_address: String, parameters: TaskParameters, priority: i32) -> Self {
        let id = format!("{}-{}", parameters.task_type(), Uuid::new_v4().simple());
        Self {
            id,
            target_address,
            parameters,
            priority,
            sequence: 0,
            status: TaskStatus::Pending,
            assigned_worker: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn task_type(&self) -> TaskType {
        self.parameters.task_type()
    }

    fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SwarmError::InvalidTransition {
                task_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn assign(&mut self, worker_id: &str) -> Result<()> {
        self.transition(TaskStatus::Assigned)?;
        self.assigned_worker = Some(worker_id.to_string());
        Ok(())
    }

    pub fn start(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition(TaskStatus::Running)?;
        self.started_at = Some(at);
        Ok(())
    }

    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition(TaskStatus::Completed)?;
        self.completed_at = Some(at);
        Ok(())
    }

    pub fn fail(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition(TaskStatus::Failed)?;
        self.completed_at = Some(at);
        Ok(())
    }
}
