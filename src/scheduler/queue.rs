use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::{Result, SwarmError};
use crate::scheduler::task::{Task, TaskStatus};

const DEFAULT_MAX_TASKS: usize = 10_000;

/// Live task queue. Holds pending and in-flight tasks; terminal tasks linger
/// only until the next cleanup pass moves them out.
#[derive(Debug)]
pub struct TaskQueue {
    tasks: HashMap<String, Task>,
    next_sequence: u64,
    max_tasks: usize,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_TASKS)
    }

    pub fn with_capacity(max_tasks: usize) -> Self {
        Self {
            tasks: HashMap::new(),
            next_sequence: 0,
            max_tasks,
        }
    }

    /// Add a task, stamping its submission sequence. Returns false if the
    /// queue is at capacity.
    pub fn add_task(&mut self, mut task: Task) -> bool {
        if self.is_full() {
            return false;
        }
        task.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.tasks.insert(task.id.clone(), task);
        true
    }

    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Pending tasks in dispatch order: highest priority first, submission
    /// order among equals.
    pub fn pending_tasks(&self) -> Vec<&Task> {
        let mut pending: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect();
        pending.sort_by_key(|t| (Reverse(t.priority), t.sequence));
        pending
    }

    /// All tasks in submission order.
    pub fn all_tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.values().collect();
        tasks.sort_by_key(|t| t.sequence);
        tasks
    }

    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|t| t.status == status).count()
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut Task> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| SwarmError::TaskNotFound(id.to_string()))
    }

    pub fn assign_task(&mut self, id: &str, worker_id: &str) -> Result<()> {
        self.task_mut(id)?.assign(worker_id)
    }

    pub fn start_task(&mut self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.task_mut(id)?.start(at)
    }

    /// Mark a running task completed and return a snapshot of it.
    pub fn complete_task(&mut self, id: &str, at: DateTime<Utc>) -> Result<Task> {
        let task = self.task_mut(id)?;
        task.complete(at)?;
        Ok(task.clone())
    }

    /// Mark an in-flight task failed and return a snapshot of it.
    pub fn fail_task(&mut self, id: &str, at: DateTime<Utc>) -> Result<Task> {
        let task = self.task_mut(id)?;
        task.fail(at)?;
        Ok(task.clone())
    }

    /// Remove completed and failed tasks. Returns the number removed.
    pub fn cleanup_finished_tasks(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, task| !task.status.is_terminal());
        before - self.tasks.len()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tasks.len() >= self.max_tasks
    }

    pub fn capacity(&self) -> usize {
        self.max_tasks
    }
}
