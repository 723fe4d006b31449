//! Application wiring: build the shared state tree from configuration.
//!
//! Everything is constructed here, once, and passed down — no global
//! singletons. External collaborators without configured providers get
//! honest placeholders that fail with a clear message instead of panicking.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use ha_bus::MemoryBus;
use ha_domain::config::Config;
use ha_guardrails::CommandGuard;
use ha_providers::ProviderRegistry;
use ha_sandbox::{Sandbox, SandboxKind, SandboxManager, SandboxManagerSet, SandboxRuntime};
use ha_skills::{ExecutionStore, SkillRegistry};

use crate::api::rate_limit::RateLimiter;
use crate::runtime::interrupt::InterruptManager;
use crate::runtime::tools::builtin::ToolDispatcher;
use crate::runtime::tools::external::{MockImageProvider, MockSearchProvider};
use crate::runtime::tools::pipeline::ToolPipeline;
use crate::runtime::{CancelMap, JobQueue, TaskStore};
use crate::state::AppState;

/// Sandbox runtime placeholder used until a real provider is wired in.
/// Creation fails with an actionable message; nothing ever leaks.
struct UnconfiguredRuntime(SandboxKind);

#[async_trait]
impl SandboxRuntime for UnconfiguredRuntime {
    fn kind(&self) -> SandboxKind {
        self.0
    }

    async fn create(&self) -> ha_domain::Result<Box<dyn Sandbox>> {
        Err(ha_domain::Error::Sandbox(format!(
            "no {} sandbox provider configured",
            self.0.as_str()
        )))
    }
}

/// Build the full application state tree.
pub fn build_state(config: Arc<Config>) -> AppState {
    let bus = Arc::new(MemoryBus::new());
    let llm = Arc::new(ProviderRegistry::from_config(&config.llm));

    let task_store = Arc::new(TaskStore::new(&config.queue.state_path));
    let queue = Arc::new(JobQueue::new());
    let cancel_map = Arc::new(CancelMap::new());
    let interrupts = Arc::new(InterruptManager::new());

    let ttl = Duration::from_secs(config.sandbox.session_ttl_secs);
    let cap = config.sandbox.max_sessions;
    let sandboxes = Arc::new(SandboxManagerSet {
        execution: SandboxManager::new(
            Arc::new(UnconfiguredRuntime(SandboxKind::Execution)),
            ttl,
            cap,
        ),
        desktop: SandboxManager::new(
            Arc::new(UnconfiguredRuntime(SandboxKind::Desktop)),
            ttl,
            cap,
        ),
        app: SandboxManager::new(Arc::new(UnconfiguredRuntime(SandboxKind::App)), ttl, cap),
    });

    let skill_registry = Arc::new(SkillRegistry::with_builtins());
    let skill_store = Arc::new(ExecutionStore::new(&config.skills.state_path));

    // The dispatcher needs one concrete LLM for skill model-steps; fall
    // back to any configured provider.
    let dispatcher_llm = llm
        .resolve_executor(None)
        .map(|(provider, _)| provider)
        .unwrap_or_else(|| Arc::new(ha_providers::MockProvider::new("unconfigured")));

    let dispatcher = Arc::new(ToolDispatcher {
        config: config.clone(),
        search: Arc::new(MockSearchProvider),
        image: Arc::new(MockImageProvider),
        sandboxes: sandboxes.clone(),
        skill_registry: skill_registry.clone(),
        skill_store: skill_store.clone(),
        interrupts: interrupts.clone(),
        llm: dispatcher_llm,
        http: reqwest::Client::new(),
        command_guard: CommandGuard::new(),
    });
    let pipeline = Arc::new(ToolPipeline::new(
        config.clone(),
        dispatcher,
        interrupts.clone(),
    ));

    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit.rpm,
        config.rate_limit.enabled,
    ));

    AppState {
        config,
        llm,
        bus,
        task_store,
        queue,
        cancel_map,
        pipeline,
        sandboxes,
        interrupts,
        skill_registry,
        skill_store,
        rate_limiter,
    }
}

/// Startup hooks: sandbox reapers and rate-limiter pruning.
pub fn spawn_background_tasks(state: &AppState) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = state
        .sandboxes
        .spawn_reapers(Duration::from_secs(state.config.sandbox.reap_interval_secs));

    let limiter = state.rate_limiter.clone();
    handles.push(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(120));
        loop {
            ticker.tick().await;
            limiter.prune();
        }
    }));

    handles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.queue.state_path = dir.path().to_path_buf();
        config.skills.state_path = dir.path().to_path_buf();

        let state = build_state(Arc::new(config));
        assert!(state.llm.is_empty()); // no providers configured by default
        assert!(state.skill_registry.len() >= 5);
        assert_eq!(state.queue.pending_count(), 0);
    }

    #[tokio::test]
    async fn unconfigured_sandbox_fails_cleanly() {
        let runtime = UnconfiguredRuntime(SandboxKind::Execution);
        match runtime.create().await {
            Err(err) => assert!(err.to_string().contains("no execution sandbox provider")),
            Ok(_) => panic!("expected unconfigured sandbox runtime to fail"),
        }
    }
}
