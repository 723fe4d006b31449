//! Tool catalogue, dispatchers, and the execution pipeline.

pub mod builtin;
pub mod external;
pub mod pipeline;
pub mod registry;
pub mod risk;

use std::sync::Arc;

use ha_bus::ProgressReporter;

/// Per-invocation context injected by the orchestrator — never supplied
/// by the model.
#[derive(Clone)]
pub struct ToolContext {
    pub user_id: String,
    pub task_id: String,
    /// Thread key for interrupts (equals the task id for background runs).
    pub thread_id: String,
    pub reporter: Arc<ProgressReporter>,
}

impl ToolContext {
    pub fn new(
        user_id: impl Into<String>,
        task_id: impl Into<String>,
        reporter: Arc<ProgressReporter>,
    ) -> Self {
        let task_id = task_id.into();
        Self {
            user_id: user_id.into(),
            thread_id: task_id.clone(),
            task_id,
            reporter,
        }
    }
}
