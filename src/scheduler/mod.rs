pub mod assigner;
pub mod queue;
pub mod results;
pub mod task;

pub use assigner::{Assignment, Capability, TaskAssigner};
pub use queue::TaskQueue;
pub use results::{ResultStore, ResultStores, SwarmMetrics, TaskRecord};
pub use task::{
    ComprehensiveAnalysisParams, Task, TaskParameters, TaskStatus, TaskType, TokenAnalysisParams,
    TransactionAnalysisParams,
};
