//! Event bus — the pub/sub bridge between workers and streaming clients.
//!
//! Workers publish [`ha_domain::EventEnvelope`]s on per-task channels; SSE
//! connections subscribe and replay them to the browser. The broker is a
//! late-arrival bus: subscribers only see events published after they
//! subscribed (reconnection recovery goes through the task row instead).

pub mod broker;
pub mod progress;

pub use broker::{EventBus, MemoryBus};
pub use progress::ProgressReporter;

/// The per-task progress channel name.
pub fn progress_channel(task_id: &str) -> String {
    format!("hyperagent:progress:{task_id}")
}
