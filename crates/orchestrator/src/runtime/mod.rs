//! The execution substrate: cancellation, interrupts, the ReAct driver,
//! agents, supervisor/handoffs, and the task queue + worker.

pub mod agent_state;
pub mod agents;
pub mod cancel;
pub mod context;
pub mod handoff;
pub mod interrupt;
pub mod queue;
pub mod react;
pub mod supervisor;
pub mod tools;
pub mod worker;

pub use cancel::{CancelMap, CancelToken};
pub use interrupt::{Interrupt, InterruptAction, InterruptManager, InterruptResponse};
pub use queue::{Job, JobQueue, Task, TaskKind, TaskStatus, TaskStore};
pub use react::{run_react_loop, ReactDeps, ReactOutcome};
pub use supervisor::{run_supervisor, SupervisorDeps, SupervisorInput};
pub use worker::{process_job, Worker, WorkerContext};
