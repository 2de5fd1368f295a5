use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::{Result, SwarmError};
use crate::scheduler::results::{DEFAULT_COMPLETED_RETENTION, DEFAULT_FAILED_RETENTION};
use crate::scheduler::Capability;

/// A worker to register when the coordinator starts.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub id: String,
    pub worker_type: String,
    pub capabilities: BTreeSet<Capability>,
}

impl WorkerConfig {
    pub fn new(id: impl Into<String>, worker_type: impl Into<String>, capabilities: &[Capability]) -> Self {
        Self {
            id: id.into(),
            worker_type: worker_type.into(),
            capabilities: capabilities.iter().copied().collect(),
        }
    }

    /// `count` workers of one kind, named `<worker_type>-1..=count`.
    ///
    /// Kinds: `token`, `transaction` and `risk` (the latter can run every
    /// task type, including comprehensive analysis).
    pub fn pool(kind: &str, count: usize) -> Result<Vec<Self>> {
        let (worker_type, capabilities): (&str, &[Capability]) = match kind {
            "token" => ("token-analyzer", &[Capability::TokenAnalysis][..]),
            "transaction" => ("transaction-analyzer", &[Capability::TransactionAnalysis][..]),
            "risk" => (
                "risk-assessor",
                &[
                    Capability::TokenAnalysis,
                    Capability::TransactionAnalysis,
                    Capability::RiskAssessment,
                ][..],
            ),
            other => {
                return Err(SwarmError::Config(format!(
                    "unknown worker kind {:?}, expected token, transaction or risk",
                    other
                )))
            }
        };

        Ok((1..=count)
            .map(|n| Self::new(format!("{}-{}", worker_type, n), worker_type, capabilities))
            .collect())
    }
}

/// Parse a pool description such as `"token:2,transaction:2,risk:1"`.
pub fn parse_workers(list: &str) -> Result<Vec<WorkerConfig>> {
    let mut workers = Vec::new();
    for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((kind, count)) = entry.split_once(':') else {
            return Err(SwarmError::Config(format!(
                "invalid worker entry {:?}, expected kind:count",
                entry
            )));
        };
        let count: usize = count
            .trim()
            .parse()
            .map_err(|_| SwarmError::Config(format!("invalid worker count in {:?}", entry)))?;
        workers.extend(WorkerConfig::pool(kind.trim(), count)?);
    }
    Ok(workers)
}

#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Pause between coordinator iterations.
    pub loop_interval_ms: u64,
    /// Pause after an iteration that failed.
    pub error_backoff_ms: u64,
    /// Heartbeat age after which a worker is taken offline.
    pub heartbeat_timeout_ms: u64,
    /// How often heartbeat senders report in.
    pub heartbeat_interval_ms: u64,
    /// Poll interval for `wait_for_completion`.
    pub poll_interval_ms: u64,
    pub completed_retention: usize,
    pub failed_retention: usize,
    /// Live queue bound; submissions beyond it are refused.
    pub max_queued_tasks: usize,
    pub workers: Vec<WorkerConfig>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        let mut workers = Vec::new();
        for (kind, count) in [("token", 2), ("transaction", 2), ("risk", 1)] {
            if let Ok(pool) = WorkerConfig::pool(kind, count) {
                workers.extend(pool);
            }
        }

        Self {
            loop_interval_ms: 1_000,
            error_backoff_ms: 5_000,
            heartbeat_timeout_ms: 5 * 60 * 1_000,
            heartbeat_interval_ms: 30_000,
            poll_interval_ms: 1_000,
            completed_retention: DEFAULT_COMPLETED_RETENTION,
            failed_retention: DEFAULT_FAILED_RETENTION,
            max_queued_tasks: 10_000,
            workers,
        }
    }
}

impl SwarmConfig {
    pub fn with_workers(mut self, workers: Vec<WorkerConfig>) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.workers.push(worker);
        self
    }

    pub fn with_loop_interval_ms(mut self, ms: u64) -> Self {
        self.loop_interval_ms = ms;
        self
    }

    pub fn with_heartbeat_timeout_ms(mut self, ms: u64) -> Self {
        self.heartbeat_timeout_ms = ms;
        self
    }

    pub fn with_heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = ms;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_retention(mut self, completed: usize, failed: usize) -> Self {
        self.completed_retention = completed;
        self.failed_retention = failed;
        self
    }

    pub fn with_max_queued_tasks(mut self, max: usize) -> Self {
        self.max_queued_tasks = max;
        self
    }

    pub fn loop_interval(&self) -> Duration {
        Duration::from_millis(self.loop_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
