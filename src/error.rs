use thiserror::Error;

use crate::scheduler::TaskStatus;

#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Invalid task parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid target address: {0:?}")]
    InvalidTarget(String),

    #[error("Task queue is at capacity ({0} tasks)")]
    QueueFull(usize),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    #[error("Worker {0} is busy")]
    WorkerBusy(String),

    #[error("Invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SwarmError>;
