//! The ReAct loop driver — bounded, cancellable, retry-aware alternation
//! of model calls and tool execution.
//!
//! State machine per invocation:
//!
//! ```text
//! INIT → MODEL_CALL → (no tool → DONE) | (tool → EXECUTE_TOOLS)
//! EXECUTE_TOOLS → (HITL gate → SUSPENDED → resume) | → MODEL_CALL
//! any state → CANCELLED | FATAL_ERROR | BUDGET_EXCEEDED
//! ```
//!
//! The driver owns the `AgentState` for the duration of the invocation and
//! is the only writer of its loop counters.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;

use ha_domain::backoff::BackoffPolicy;
use ha_domain::config::Config;
use ha_domain::event::Event;
use ha_domain::stream::StreamEvent;
use ha_domain::{classify_error, Error, Message, Result, ToolCall, ToolDescriptor, Usage};
use ha_providers::{AgentType, ChatRequest, LlmProvider};

use super::agent_state::AgentState;
use super::cancel::CancelToken;
use super::context;
use super::tools::pipeline::{GateOutcome, ToolPipeline};
use super::tools::registry::is_handoff_tool;
use super::tools::ToolContext;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inputs / outputs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ReactDeps {
    pub provider: Arc<dyn LlmProvider>,
    pub model: Option<String>,
    pub pipeline: Arc<ToolPipeline>,
    pub config: Arc<Config>,
    pub cancel: CancelToken,
    /// Tool retry pacing; tests shrink the delays.
    pub retry: BackoffPolicy,
}

/// How one invocation ended (errors are the `Err` side of the `Result`).
#[derive(Debug)]
pub enum ReactOutcome {
    /// The model produced a final textual answer.
    Final { response: String, usage: Usage },
    /// The model requested a handoff; the supervisor decides what happens.
    /// The assistant message carrying the handoff tool-use is already in
    /// `state.messages`, with no tool result yet — the supervisor appends
    /// one (success or rejection) before any further model call.
    Handoff {
        call_id: String,
        target: AgentType,
        task_description: String,
        context: String,
        usage: Usage,
    },
}

/// What one model step produced.
struct ModelStep {
    text: String,
    tool_calls: Vec<ToolCall>,
    usage: Option<Usage>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Driver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn run_react_loop(
    deps: &ReactDeps,
    ctx: &ToolContext,
    state: &mut AgentState,
    tools: Vec<ToolDescriptor>,
) -> Result<ReactOutcome> {
    let react = &deps.config.react;

    if state.messages.is_empty() {
        state.messages.push(Message::user(state.query.clone()));
    }

    let mut total_usage = Usage::default();

    loop {
        if deps.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if state.tool_iterations >= react.max_iterations {
            return Err(Error::BudgetExceeded(react.max_iterations));
        }

        // ── Context hygiene before the call ───────────────────────
        if context::should_compress(&state.messages, react) {
            if let Some(summary) = context::compress_history(
                deps.provider.as_ref(),
                deps.model.clone(),
                &mut state.messages,
                react.preserve_recent,
            )
            .await
            {
                state.context_summary = Some(summary);
            }
        }
        state.messages = context::truncate_to_budget(
            std::mem::take(&mut state.messages),
            react.token_budget,
            react.preserve_recent,
        );

        // ── Model call ────────────────────────────────────────────
        let step = call_model(deps, ctx, state, &tools).await?;
        if let Some(usage) = &step.usage {
            total_usage.accumulate(usage);
        }

        if step.tool_calls.is_empty() {
            return Ok(ReactOutcome::Final {
                response: step.text,
                usage: total_usage,
            });
        }

        state
            .messages
            .push(Message::assistant_with_tool_calls(&step.text, &step.tool_calls));

        // Ordinary tools run first; a handoff is deferred to the end of
        // the step and consumed by the supervisor.
        let (handoffs, ordinary): (Vec<ToolCall>, Vec<ToolCall>) = step
            .tool_calls
            .into_iter()
            .partition(|tc| is_handoff_tool(&tc.tool_name));

        for call in &ordinary {
            if deps.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            execute_one_call(deps, ctx, state, call).await?;
        }

        if let Some(handoff) = handoffs.first() {
            // Extra handoffs in the same step are refused outright.
            for extra in handoffs.iter().skip(1) {
                state.messages.push(Message::tool_result_with(
                    &extra.call_id,
                    "Only one handoff per step is allowed",
                    true,
                ));
            }

            let target_name = handoff
                .tool_name
                .trim_start_matches("handoff_to_")
                .to_string();
            let target = match ha_providers::canonical_agent_name(&target_name) {
                Some(target) => target,
                None => {
                    state.messages.push(Message::tool_result_with(
                        &handoff.call_id,
                        format!("Unknown handoff target: {target_name}"),
                        true,
                    ));
                    state.tool_iterations += 1;
                    continue;
                }
            };
            let task_description = handoff
                .arguments
                .get("task_description")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let handoff_context = handoff
                .arguments
                .get("context")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();

            state.tool_iterations += 1;
            return Ok(ReactOutcome::Handoff {
                call_id: handoff.call_id.clone(),
                target,
                task_description,
                context: handoff_context,
                usage: total_usage,
            });
        }

        state.tool_iterations += 1;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model step
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Stream one model reply, forwarding tokens and assembling tool calls.
async fn call_model(
    deps: &ReactDeps,
    ctx: &ToolContext,
    state: &AgentState,
    tools: &[ToolDescriptor],
) -> Result<ModelStep> {
    let req = ChatRequest {
        messages: state.messages.clone(),
        tools: tools.to_vec(),
        temperature: Some(0.2),
        max_tokens: None,
        json_mode: false,
        model: state.model.clone().or_else(|| deps.model.clone()),
    };

    let timeout = std::time::Duration::from_secs(deps.config.react.model_timeout_secs);
    let consume = async {
        let mut stream = deps.provider.chat_stream(&req).await?;

        let mut text = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut usage: Option<Usage> = None;
        // call_id → (name, partial args) for providers that only stream
        // deltas without a finish marker.
        let mut partial: std::collections::HashMap<String, (String, String)> =
            std::collections::HashMap::new();

        loop {
            let event = tokio::select! {
                _ = deps.cancel.cancelled() => return Err(Error::Cancelled),
                event = stream.next() => event,
            };
            let Some(event) = event else { break };

            match event? {
                StreamEvent::Token { text: chunk } => {
                    ctx.reporter.emit_token(&chunk).await;
                    text.push_str(&chunk);
                }
                StreamEvent::Thinking { text: thinking } => {
                    ctx.reporter
                        .emit(Event::Reasoning {
                            thinking,
                            confidence: None,
                            context: None,
                        })
                        .await;
                }
                StreamEvent::ToolCallStarted { call_id, tool_name } => {
                    partial.insert(call_id, (tool_name, String::new()));
                }
                StreamEvent::ToolCallDelta { call_id, delta } => {
                    if let Some((_, args)) = partial.get_mut(&call_id) {
                        args.push_str(&delta);
                    }
                }
                StreamEvent::ToolCallFinished {
                    call_id,
                    tool_name,
                    arguments,
                } => {
                    partial.remove(&call_id);
                    tool_calls.push(ToolCall {
                        call_id,
                        tool_name,
                        arguments,
                    });
                }
                StreamEvent::Done {
                    usage: step_usage, ..
                } => {
                    usage = step_usage;
                }
                StreamEvent::Error { message } => {
                    return Err(Error::Provider {
                        provider: deps.provider.provider_id().to_string(),
                        message,
                    });
                }
            }
        }

        // Assemble stragglers that never saw a finish marker.
        for (call_id, (tool_name, args)) in partial.drain() {
            let arguments = if args.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&args).unwrap_or_else(|e| {
                    tracing::warn!(
                        call_id = %call_id,
                        tool = %tool_name,
                        error = %e,
                        "tool call arguments are not valid JSON; defaulting to empty object"
                    );
                    Value::Object(Default::default())
                })
            };
            tool_calls.push(ToolCall {
                call_id,
                tool_name,
                arguments,
            });
        }

        ctx.reporter.flush_tokens().await;
        Ok(ModelStep {
            text,
            tool_calls,
            usage,
        })
    };

    match tokio::time::timeout(timeout, consume).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "model call timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool step
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Gate, execute (with transient retries), post-process, and record one
/// ordinary tool call.
async fn execute_one_call(
    deps: &ReactDeps,
    ctx: &ToolContext,
    state: &mut AgentState,
    call: &ToolCall,
) -> Result<()> {
    // ── before_execution: risk gate (may suspend on HITL) ─────────
    let gate = tokio::select! {
        _ = deps.cancel.cancelled() => return Err(Error::Cancelled),
        gate = deps
            .pipeline
            .gate(call, ctx, state.hitl_enabled, &state.auto_approve_tools) => gate,
    };

    match gate {
        GateOutcome::Denied { message } => {
            tracing::info!(tool = %call.tool_name, "tool call denied");
            state
                .messages
                .push(Message::tool_result_with(&call.call_id, &message, true));
            return Ok(());
        }
        GateOutcome::Proceed { approve_always } => {
            if approve_always {
                state.auto_approve_tools.insert(call.tool_name.clone());
            }
        }
    }

    ctx.reporter
        .emit(Event::ToolCall {
            tool: call.tool_name.clone(),
            args: call.arguments.clone(),
            id: call.call_id.clone(),
        })
        .await;

    // ── execution with transient retries ──────────────────────────
    let max_tries = deps.config.react.tool_max_tries.max(1);
    let mut attempt: u32 = 0;
    let (content, is_error) = loop {
        let (content, is_error) = tokio::select! {
            _ = deps.cancel.cancelled() => return Err(Error::Cancelled),
            result = deps.pipeline.execute_once(call, ctx) => result,
        };
        if !is_error {
            break (content, false);
        }

        let category = classify_error(&content);
        if category.is_retryable() && attempt + 1 < max_tries {
            let delay = deps.retry.delay_for_attempt(attempt);
            tracing::warn!(
                tool = %call.tool_name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                category = %category,
                "transient tool failure, retrying"
            );
            attempt += 1;
            tokio::select! {
                _ = deps.cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            continue;
        }

        tracing::warn!(
            tool = %call.tool_name,
            category = %category,
            "tool failed"
        );
        break (content, true);
    };

    // ── after_execution: redaction + truncation ───────────────────
    let content = deps.pipeline.post_process(&content);

    ctx.reporter
        .emit(Event::ToolResult {
            tool: call.tool_name.clone(),
            output: content.clone(),
            id: call.call_id.clone(),
            is_error,
        })
        .await;

    state
        .messages
        .push(Message::tool_result_with(&call.call_id, &content, is_error));

    // ── circuit breaker ───────────────────────────────────────────
    if is_error {
        state.consecutive_errors += 1;
        if state.consecutive_errors >= deps.config.react.consecutive_error_limit {
            return Err(Error::Other(format!(
                "aborted after {} consecutive tool errors",
                state.consecutive_errors
            )));
        }
    } else {
        state.consecutive_errors = 0;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::interrupt::{InterruptAction, InterruptManager};
    use crate::runtime::tools::external::{
        MockImageProvider, SearchProvider, SearchResult,
    };
    use crate::runtime::tools::builtin::ToolDispatcher;
    use crate::runtime::tools::registry::tools_for_agent;
    use ha_bus::{EventBus, MemoryBus, ProgressReporter};
    use ha_domain::EventEnvelope;
    use ha_guardrails::CommandGuard;
    use ha_providers::MockProvider;
    use ha_sandbox::{
        ExecOutput, ExecRequest, FileOpResult, FileOperation, Sandbox, SandboxKind,
        SandboxManager, SandboxManagerSet, SandboxRuntime,
    };
    use ha_skills::{ExecutionStore, SkillRegistry};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    // ── test doubles ───────────────────────────────────────────────

    /// Search provider that fails transiently once, then succeeds.
    struct FlakySearch {
        failed_once: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SearchProvider for FlakySearch {
        async fn search(
            &self,
            query: &str,
            _max_results: usize,
            _advanced: bool,
        ) -> ha_domain::Result<Vec<SearchResult>> {
            self.calls.fetch_add(1, Ordering::AcqRel);
            if !self.failed_once.swap(true, Ordering::AcqRel) {
                return Err(Error::Http("503 Service Unavailable".into()));
            }
            Ok(vec![SearchResult {
                title: format!("About {query}"),
                url: "https://example.com/1".into(),
                snippet: "snippet".into(),
                relevance_score: Some(0.9),
            }])
        }
    }

    struct OkSandbox;

    #[async_trait::async_trait]
    impl Sandbox for OkSandbox {
        fn id(&self) -> &str {
            "sbx-ok"
        }
        async fn exec(&self, _req: ExecRequest) -> ha_domain::Result<ExecOutput> {
            Ok(ExecOutput {
                stdout: "1\n".into(),
                exit_code: Some(0),
                ..Default::default()
            })
        }
        async fn file_op(&self, _op: FileOperation) -> ha_domain::Result<FileOpResult> {
            Ok(FileOpResult {
                success: true,
                ..Default::default()
            })
        }
        async fn is_alive(&self) -> bool {
            true
        }
        async fn destroy(&self) -> ha_domain::Result<()> {
            Ok(())
        }
    }

    struct OkRuntime {
        kind: SandboxKind,
        created: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl SandboxRuntime for OkRuntime {
        fn kind(&self) -> SandboxKind {
            self.kind
        }
        async fn create(&self) -> ha_domain::Result<Box<dyn Sandbox>> {
            self.created.fetch_add(1, Ordering::AcqRel);
            Ok(Box::new(OkSandbox))
        }
    }

    struct Harness {
        deps: ReactDeps,
        ctx: ToolContext,
        interrupts: Arc<InterruptManager>,
        provider: Arc<MockProvider>,
        sandbox_creates: Arc<AtomicUsize>,
        search_calls: Arc<FlakySearch>,
        bus: Arc<MemoryBus>,
        _tmp: tempfile::TempDir,
    }

    fn harness() -> Harness {
        harness_with_config(Config::default())
    }

    fn harness_with_config(config: Config) -> Harness {
        let config = Arc::new(config);
        let bus = Arc::new(MemoryBus::new());
        let reporter = Arc::new(ProgressReporter::new(bus.clone(), "t1"));
        let ctx = ToolContext::new("u1", "t1", reporter);
        let interrupts = Arc::new(InterruptManager::new());
        let provider = MockProvider::new("mock");
        let tmp = tempfile::tempdir().unwrap();
        let sandbox_creates = Arc::new(AtomicUsize::new(0));
        let search = Arc::new(FlakySearch {
            failed_once: AtomicBool::new(true), // default: healthy
            calls: AtomicUsize::new(0),
        });

        let sandboxes = Arc::new(SandboxManagerSet {
            execution: SandboxManager::new(
                Arc::new(OkRuntime {
                    kind: SandboxKind::Execution,
                    created: sandbox_creates.clone(),
                }),
                std::time::Duration::from_secs(600),
                4,
            ),
            desktop: SandboxManager::new(
                Arc::new(OkRuntime {
                    kind: SandboxKind::Desktop,
                    created: Arc::new(AtomicUsize::new(0)),
                }),
                std::time::Duration::from_secs(600),
                4,
            ),
            app: SandboxManager::new(
                Arc::new(OkRuntime {
                    kind: SandboxKind::App,
                    created: Arc::new(AtomicUsize::new(0)),
                }),
                std::time::Duration::from_secs(600),
                4,
            ),
        });

        let dispatcher = Arc::new(ToolDispatcher {
            config: config.clone(),
            search: search.clone(),
            image: Arc::new(MockImageProvider),
            sandboxes,
            skill_registry: Arc::new(SkillRegistry::with_builtins()),
            skill_store: Arc::new(ExecutionStore::new(tmp.path())),
            interrupts: interrupts.clone(),
            llm: Arc::new(provider.clone()),
            http: reqwest::Client::new(),
            command_guard: CommandGuard::new(),
        });

        let pipeline = Arc::new(ToolPipeline::new(
            config.clone(),
            dispatcher,
            interrupts.clone(),
        ));

        let deps = ReactDeps {
            provider: Arc::new(provider.clone()),
            model: None,
            pipeline,
            config,
            cancel: CancelToken::new(),
            retry: BackoffPolicy {
                base_delay: std::time::Duration::from_millis(5),
                max_delay: std::time::Duration::from_millis(50),
                max_retries: 3,
            },
        };

        Harness {
            deps,
            ctx,
            interrupts,
            provider,
            sandbox_creates,
            search_calls: search,
            bus,
            _tmp: tmp,
        }
    }

    async fn drain_events(
        bus: &Arc<MemoryBus>,
        stream: &mut ha_domain::stream::BoxStream<'static, String>,
    ) -> Vec<Event> {
        let _ = bus;
        let mut events = Vec::new();
        loop {
            match tokio::time::timeout(std::time::Duration::from_millis(50), stream.next()).await
            {
                Ok(Some(payload)) => {
                    let env: EventEnvelope = serde_json::from_str(&payload).unwrap();
                    events.push(env.event);
                }
                _ => break,
            }
        }
        events
    }

    fn state() -> AgentState {
        AgentState::new("do the thing", "u1", "t1", AgentType::Task)
    }

    // ── tests ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn no_tools_terminates_with_final_response() {
        let h = harness();
        h.provider.push_text("all done");

        let mut state = state();
        let outcome = run_react_loop(&h.deps, &h.ctx, &mut state, tools_for_agent(AgentType::Task))
            .await
            .unwrap();

        match outcome {
            ReactOutcome::Final { response, .. } => assert_eq!(response, "all done"),
            other => panic!("expected Final, got {other:?}"),
        }
        assert_eq!(state.tool_iterations, 0);
    }

    #[tokio::test]
    async fn zero_iteration_budget_errors_immediately() {
        let mut config = Config::default();
        config.react.max_iterations = 0;
        let h = harness_with_config(config);
        // No scripted turns: the loop must not call the model at all.

        let mut state = state();
        let err = run_react_loop(&h.deps, &h.ctx, &mut state, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BudgetExceeded(0)));
        assert!(h.provider.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn tool_call_then_final_orders_events() {
        let h = harness();
        h.provider
            .push_tool_call("tc_1", "web_search", json!({"query": "rust"}));
        h.provider.push_text("found it");

        let mut stream = h.bus.subscribe(&ha_bus::progress_channel("t1")).await;
        let mut state = state();
        let outcome = run_react_loop(&h.deps, &h.ctx, &mut state, tools_for_agent(AgentType::Task))
            .await
            .unwrap();

        assert!(matches!(outcome, ReactOutcome::Final { .. }));
        assert_eq!(state.tool_iterations, 1);
        assert_eq!(state.consecutive_errors, 0);

        let events = drain_events(&h.bus, &mut stream).await;
        let call_pos = events
            .iter()
            .position(|e| matches!(e, Event::ToolCall { id, .. } if id == "tc_1"))
            .expect("no tool_call event");
        let result_pos = events
            .iter()
            .position(|e| matches!(e, Event::ToolResult { id, .. } if id == "tc_1"))
            .expect("no tool_result event");
        assert!(call_pos < result_pos, "tool_call must precede tool_result");
    }

    #[tokio::test]
    async fn transient_tool_failure_retries_without_second_call_event() {
        let h = harness();
        h.search_calls.failed_once.store(false, Ordering::Release); // arm one failure
        h.provider
            .push_tool_call("tc_1", "web_search", json!({"query": "X"}));
        h.provider.push_text("done");

        let mut stream = h.bus.subscribe(&ha_bus::progress_channel("t1")).await;
        let mut state = state();
        run_react_loop(&h.deps, &h.ctx, &mut state, tools_for_agent(AgentType::Task))
            .await
            .unwrap();

        // Provider was called twice under the hood.
        assert_eq!(h.search_calls.calls.load(Ordering::Acquire), 2);
        // Errors recovered silently: counter reset.
        assert_eq!(state.consecutive_errors, 0);

        let events = drain_events(&h.bus, &mut stream).await;
        let tool_calls = events
            .iter()
            .filter(|e| matches!(e, Event::ToolCall { .. }))
            .count();
        let tool_results = events
            .iter()
            .filter(|e| matches!(e, Event::ToolResult { is_error, .. } if !is_error))
            .count();
        assert_eq!(tool_calls, 1, "retry must not emit a second tool_call");
        assert_eq!(tool_results, 1);
    }

    #[tokio::test]
    async fn consecutive_errors_trip_circuit_breaker() {
        let h = harness();
        // Three steps, each invoking a tool that fails non-transiently.
        for i in 0..3 {
            h.provider
                .push_tool_call(&format!("tc_{i}"), "no_such_tool", json!({}));
        }

        let mut state = state();
        let err = run_react_loop(&h.deps, &h.ctx, &mut state, tools_for_agent(AgentType::Task))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("consecutive tool errors"));
        assert_eq!(state.consecutive_errors, 3);
    }

    #[tokio::test]
    async fn hitl_denial_appends_synthetic_result_and_creates_no_sandbox() {
        let h = harness();
        h.provider
            .push_tool_call("tc_1", "execute_code", json!({"code": "print(1)", "language": "python"}));
        h.provider.push_text("understood");

        let interrupts = h.interrupts.clone();
        tokio::spawn(async move {
            loop {
                if let Some(pending) = interrupts.get_pending_interrupt("t1") {
                    interrupts.submit_response(
                        "t1",
                        &pending.interrupt_id,
                        InterruptAction::Deny,
                        None,
                    );
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        });

        let mut stream = h.bus.subscribe(&ha_bus::progress_channel("t1")).await;
        let mut state = state();
        let outcome = run_react_loop(&h.deps, &h.ctx, &mut state, tools_for_agent(AgentType::Task))
            .await
            .unwrap();
        assert!(matches!(outcome, ReactOutcome::Final { .. }));

        // No sandbox was created for the denied call.
        assert_eq!(h.sandbox_creates.load(Ordering::Acquire), 0);

        // The denial is in the transcript as an error tool result.
        let denied = state.messages.iter().any(|m| {
            m.content.extract_all_text().is_empty()
                && matches!(&m.content, ha_domain::MessageContent::Parts(parts)
                    if parts.iter().any(|p| matches!(p,
                        ha_domain::ContentPart::ToolResult { content, is_error: true, .. }
                            if content.contains("denied"))))
        });
        assert!(denied, "synthetic denial result missing");

        // interrupt event emitted, but no tool_call event for the denial.
        let events = drain_events(&h.bus, &mut stream).await;
        assert!(events.iter().any(|e| matches!(e, Event::Interrupt { .. })));
        assert!(!events.iter().any(|e| matches!(e, Event::ToolCall { .. })));
    }

    #[tokio::test]
    async fn hitl_approval_executes_and_emits_tool_events() {
        let h = harness();
        h.provider
            .push_tool_call("tc_1", "execute_code", json!({"code": "print(1)", "language": "python"}));
        h.provider.push_text("ran it");

        let interrupts = h.interrupts.clone();
        tokio::spawn(async move {
            loop {
                if let Some(pending) = interrupts.get_pending_interrupt("t1") {
                    interrupts.submit_response(
                        "t1",
                        &pending.interrupt_id,
                        InterruptAction::Approve,
                        None,
                    );
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        });

        let mut stream = h.bus.subscribe(&ha_bus::progress_channel("t1")).await;
        let mut state = state();
        run_react_loop(&h.deps, &h.ctx, &mut state, tools_for_agent(AgentType::Task))
            .await
            .unwrap();

        assert_eq!(h.sandbox_creates.load(Ordering::Acquire), 1);
        let events = drain_events(&h.bus, &mut stream).await;
        let interrupt_pos = events
            .iter()
            .position(|e| matches!(e, Event::Interrupt { .. }))
            .expect("no interrupt event");
        let call_pos = events
            .iter()
            .position(|e| matches!(e, Event::ToolCall { .. }))
            .expect("no tool_call event");
        assert!(interrupt_pos < call_pos);
    }

    #[tokio::test]
    async fn approve_always_suppresses_later_interrupts() {
        let h = harness();
        h.provider
            .push_tool_call("tc_1", "execute_code", json!({"code": "print(1)", "language": "python"}));
        h.provider
            .push_tool_call("tc_2", "execute_code", json!({"code": "print(2)", "language": "python"}));
        h.provider.push_text("both ran");

        let interrupts = h.interrupts.clone();
        tokio::spawn(async move {
            loop {
                if let Some(pending) = interrupts.get_pending_interrupt("t1") {
                    interrupts.submit_response(
                        "t1",
                        &pending.interrupt_id,
                        InterruptAction::ApproveAlways,
                        None,
                    );
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        });

        let mut stream = h.bus.subscribe(&ha_bus::progress_channel("t1")).await;
        let mut state = state();
        run_react_loop(&h.deps, &h.ctx, &mut state, tools_for_agent(AgentType::Task))
            .await
            .unwrap();

        assert!(state.auto_approve_tools.contains("execute_code"));
        let events = drain_events(&h.bus, &mut stream).await;
        let interrupt_count = events
            .iter()
            .filter(|e| matches!(e, Event::Interrupt { .. }))
            .count();
        assert_eq!(interrupt_count, 1, "second call must bypass the gate");
    }

    #[tokio::test]
    async fn handoff_is_deferred_after_ordinary_tools() {
        let h = harness();
        h.provider.push_tool_calls(vec![
            ToolCall {
                call_id: "tc_h".into(),
                tool_name: "handoff_to_research".into(),
                arguments: json!({"task_description": "deep dive", "context": "please"}),
            },
            ToolCall {
                call_id: "tc_s".into(),
                tool_name: "web_search".into(),
                arguments: json!({"query": "rust"}),
            },
        ]);

        let mut state = state();
        let outcome = run_react_loop(&h.deps, &h.ctx, &mut state, tools_for_agent(AgentType::Task))
            .await
            .unwrap();

        match outcome {
            ReactOutcome::Handoff {
                call_id,
                target,
                task_description,
                ..
            } => {
                assert_eq!(call_id, "tc_h");
                assert_eq!(target, AgentType::Research);
                assert_eq!(task_description, "deep dive");
            }
            other => panic!("expected Handoff, got {other:?}"),
        }
        // The ordinary search ran before the handoff was surfaced.
        assert_eq!(h.search_calls.calls.load(Ordering::Acquire), 1);
        // The handoff tool-use has no result yet (supervisor appends it).
        let results: usize = state
            .messages
            .iter()
            .filter_map(|m| match &m.content {
                ha_domain::MessageContent::Parts(parts) => Some(
                    parts
                        .iter()
                        .filter(|p| matches!(p, ha_domain::ContentPart::ToolResult { tool_use_id, .. } if tool_use_id == "tc_h"))
                        .count(),
                ),
                _ => None,
            })
            .sum();
        assert_eq!(results, 0);
    }

    #[tokio::test]
    async fn cancellation_wins_over_model_call() {
        let h = harness();
        h.deps.cancel.cancel();
        let mut state = state();
        let err = run_react_loop(&h.deps, &h.ctx, &mut state, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn iteration_budget_exceeded_mid_run() {
        let mut config = Config::default();
        config.react.max_iterations = 2;
        let h = harness_with_config(config);
        for i in 0..3 {
            h.provider
                .push_tool_call(&format!("tc_{i}"), "web_search", json!({"query": "x"}));
        }

        let mut state = state();
        let err = run_react_loop(&h.deps, &h.ctx, &mut state, tools_for_agent(AgentType::Task))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BudgetExceeded(2)));
        assert_eq!(state.tool_iterations, 2);
    }
}
