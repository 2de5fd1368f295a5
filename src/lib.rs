pub mod analysis;
pub mod config;
pub mod coordinator;
pub mod dashboard;
pub mod error;
pub mod scheduler;
pub mod shutdown;
pub mod worker;

pub use coordinator::{SwarmCoordinator, SwarmStatus, TaskStatusReport, WaitOutcome};
pub use error::{Result, SwarmError};
