//! Shared application state, constructed once in `main` and threaded
//! through every handler and worker — there are no module-level
//! singletons.

use std::sync::Arc;

use ha_bus::broker::EventBus;
use ha_domain::backoff::BackoffPolicy;
use ha_domain::config::Config;
use ha_providers::ProviderRegistry;
use ha_sandbox::SandboxManagerSet;
use ha_skills::{ExecutionStore, SkillRegistry};

use crate::api::rate_limit::RateLimiter;
use crate::runtime::interrupt::InterruptManager;
use crate::runtime::tools::pipeline::ToolPipeline;
use crate::runtime::{CancelMap, JobQueue, TaskStore, WorkerContext};

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services** — config, LLM providers, event bus
/// - **Queue & tasks** — durable task rows, job queue, cancellation
/// - **Execution** — tool pipeline, sandboxes, interrupts
/// - **Skills** — registry and execution records
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────
    pub config: Arc<Config>,
    pub llm: Arc<ProviderRegistry>,
    pub bus: Arc<dyn EventBus>,

    // ── Queue & tasks ─────────────────────────────────────────────
    pub task_store: Arc<TaskStore>,
    pub queue: Arc<JobQueue>,
    pub cancel_map: Arc<CancelMap>,

    // ── Execution ─────────────────────────────────────────────────
    pub pipeline: Arc<ToolPipeline>,
    pub sandboxes: Arc<SandboxManagerSet>,
    pub interrupts: Arc<InterruptManager>,

    // ── Skills ────────────────────────────────────────────────────
    pub skill_registry: Arc<SkillRegistry>,
    pub skill_store: Arc<ExecutionStore>,

    // ── Edge ──────────────────────────────────────────────────────
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Build the worker context view over this state.
    pub fn worker_context(&self, worker_id: impl Into<String>) -> Arc<WorkerContext> {
        Arc::new(WorkerContext {
            config: self.config.clone(),
            store: self.task_store.clone(),
            queue: self.queue.clone(),
            bus: self.bus.clone(),
            cancel_map: self.cancel_map.clone(),
            interrupts: self.interrupts.clone(),
            sandboxes: self.sandboxes.clone(),
            llm: self.llm.clone(),
            pipeline: self.pipeline.clone(),
            retry: BackoffPolicy::default(),
            worker_id: worker_id.into(),
        })
    }
}
