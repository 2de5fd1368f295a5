//! Worker side of the swarm.
//!
//! Workers are logical execution slots, not processes:
//! - **Registry**: capability tags, health state and performance metrics
//! - **Execution**: runs the analysis function for an assigned task
//! - **Heartbeat**: keeps a worker from being declared offline
//!
//! # Health
//!
//! A worker whose heartbeat is older than the configured timeout is taken
//! offline by the coordinator, and whatever task it held is failed on the
//! spot. Nothing is reassigned and the worker stays offline until it is
//! registered again.

pub mod executor;
pub mod heartbeat;
pub mod registry;

pub use executor::{ExecutionResult, TaskExecutor};
pub use heartbeat::HeartbeatSender;
pub use registry::{PerformanceMetrics, Worker, WorkerRegistry, WorkerStatus};
