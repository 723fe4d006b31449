//! The tool execution pipeline: pre-execution policy hooks, bounded
//! execution, and post-execution output hygiene.
//!
//! `gate` runs once per tool call and may suspend the loop for approval;
//! `execute_once` runs per attempt (the driver owns retries); and
//! `post_process` redacts and truncates results before they re-enter the
//! conversation.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use ha_domain::config::Config;
use ha_domain::event::Event;
use ha_domain::ToolCall;
use ha_guardrails::{truncate_result, validate_url, CommandGuard, OutputScanner};

use crate::runtime::interrupt::{Interrupt, InterruptAction, InterruptManager};

use super::builtin::{tool_timeout, ToolDispatcher};
use super::risk::{approval_message, requires_approval};
use super::ToolContext;

/// Result of the pre-execution gate.
pub enum GateOutcome {
    /// Execute the call. `approve_always` asks the driver to remember the
    /// tool in the session's auto-approve set.
    Proceed { approve_always: bool },
    /// Do not execute; append this synthetic error result instead.
    Denied { message: String },
}

pub struct ToolPipeline {
    pub config: Arc<Config>,
    pub dispatcher: Arc<ToolDispatcher>,
    pub interrupts: Arc<InterruptManager>,
    pub output_scanner: OutputScanner,
    pub command_guard: CommandGuard,
}

impl ToolPipeline {
    pub fn new(
        config: Arc<Config>,
        dispatcher: Arc<ToolDispatcher>,
        interrupts: Arc<InterruptManager>,
    ) -> Self {
        Self {
            output_scanner: OutputScanner::new(&config.guardrails),
            command_guard: CommandGuard::new(),
            config,
            dispatcher,
            interrupts,
        }
    }

    // ── before_execution ──────────────────────────────────────────

    /// Risk gate. For gated tools this emits an `interrupt` event, parks
    /// on the response, and translates the user's decision.
    pub async fn gate(
        &self,
        call: &ToolCall,
        ctx: &ToolContext,
        hitl_enabled: bool,
        auto_approve: &HashSet<String>,
    ) -> GateOutcome {
        if !requires_approval(
            &call.tool_name,
            auto_approve,
            hitl_enabled && self.config.hitl.enabled,
            self.config.hitl.risk_threshold,
        ) {
            return GateOutcome::Proceed {
                approve_always: false,
            };
        }

        let (title, message) = approval_message(&call.tool_name, &call.arguments);
        let timeout = std::time::Duration::from_secs(self.config.hitl.decision_timeout_secs);
        let interrupt = Interrupt::new(
            ctx.thread_id.clone(),
            ha_domain::event::InterruptKind::Approval,
            title.clone(),
            message.clone(),
            None,
            timeout.as_secs(),
        );
        let interrupt_id = interrupt.interrupt_id.clone();

        self.interrupts.create_interrupt(interrupt);
        ctx.reporter
            .emit(Event::Interrupt {
                interrupt_id: interrupt_id.clone(),
                title,
                message,
                options: None,
                kind: ha_domain::event::InterruptKind::Approval,
            })
            .await;

        tracing::info!(
            tool = %call.tool_name,
            interrupt_id = %interrupt_id,
            "tool approval requested"
        );

        match self
            .interrupts
            .wait_for_response(&ctx.thread_id, &interrupt_id, timeout)
            .await
        {
            Ok(response) => match response.action {
                InterruptAction::Approve => GateOutcome::Proceed {
                    approve_always: false,
                },
                InterruptAction::ApproveAlways => GateOutcome::Proceed {
                    approve_always: true,
                },
                InterruptAction::Deny | InterruptAction::Cancel => GateOutcome::Denied {
                    message: "User denied execution".into(),
                },
                InterruptAction::Skip => GateOutcome::Denied {
                    message: "User skipped this tool call".into(),
                },
                InterruptAction::Select | InterruptAction::Input => GateOutcome::Denied {
                    message: "Unexpected response to an approval request".into(),
                },
            },
            Err(_) => GateOutcome::Denied {
                message: "Approval request timed out".into(),
            },
        }
    }

    // ── execution ─────────────────────────────────────────────────

    /// Input guardrails plus one bounded execution attempt.
    /// Returns `(content, is_error)`.
    pub async fn execute_once(&self, call: &ToolCall, ctx: &ToolContext) -> (String, bool) {
        if let Some(violation) = self.scan_arguments(&call.tool_name, &call.arguments) {
            return (violation, true);
        }

        let timeout = tool_timeout(&self.config, &call.tool_name);
        match tokio::time::timeout(
            timeout,
            self.dispatcher.dispatch(&call.tool_name, &call.arguments, ctx),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => (
                format!(
                    "tool '{}' timed out after {}s",
                    call.tool_name,
                    timeout.as_secs()
                ),
                true,
            ),
        }
    }

    /// Input guardrails over user-facing arguments.
    fn scan_arguments(&self, tool_name: &str, args: &Value) -> Option<String> {
        if !self.config.guardrails.enabled {
            return None;
        }

        if let Some(url) = args.get("url").and_then(|v| v.as_str()) {
            let scan = validate_url(url, &self.config.guardrails.blocked_domains);
            if !scan.passed() {
                return Some(format!(
                    "URL rejected: {}",
                    scan.reason.unwrap_or_else(|| "invalid URL".into())
                ));
            }
        }

        let code = args
            .get("code")
            .or_else(|| args.get("command"))
            .and_then(|v| v.as_str());
        if let Some(code) = code {
            let scan = self.command_guard.scan(code);
            if !scan.passed() {
                return Some(
                    scan.reason
                        .unwrap_or_else(|| format!("{tool_name} arguments rejected")),
                );
            }
        }

        None
    }

    // ── after_execution ───────────────────────────────────────────

    /// Output guardrails: PII redaction plus byte-budget truncation.
    pub fn post_process(&self, content: &str) -> String {
        let sanitized = self.output_scanner.sanitize(content);
        truncate_result(&sanitized, self.config.guardrails.result_max_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::tools::external::{MockImageProvider, MockSearchProvider};
    use ha_bus::{MemoryBus, ProgressReporter};
    use ha_sandbox::{SandboxKind, SandboxManager, SandboxManagerSet};
    use ha_skills::{ExecutionStore, SkillRegistry};
    use serde_json::json;

    struct NoRuntime(SandboxKind);

    #[async_trait::async_trait]
    impl ha_sandbox::SandboxRuntime for NoRuntime {
        fn kind(&self) -> SandboxKind {
            self.0
        }
        async fn create(&self) -> ha_domain::Result<Box<dyn ha_sandbox::Sandbox>> {
            Err(ha_domain::Error::Sandbox("none".into()))
        }
    }

    fn pipeline() -> (ToolPipeline, ToolContext, Arc<InterruptManager>) {
        let config = Arc::new(Config::default());
        let interrupts = Arc::new(InterruptManager::new());
        let bus = Arc::new(MemoryBus::new());
        let reporter = Arc::new(ProgressReporter::new(bus, "t1"));
        let ctx = ToolContext::new("u1", "t1", reporter);
        let dir = tempfile::tempdir().unwrap();

        let sandboxes = Arc::new(SandboxManagerSet {
            execution: SandboxManager::new(
                Arc::new(NoRuntime(SandboxKind::Execution)),
                std::time::Duration::from_secs(600),
                4,
            ),
            desktop: SandboxManager::new(
                Arc::new(NoRuntime(SandboxKind::Desktop)),
                std::time::Duration::from_secs(600),
                4,
            ),
            app: SandboxManager::new(
                Arc::new(NoRuntime(SandboxKind::App)),
                std::time::Duration::from_secs(600),
                4,
            ),
        });

        let dispatcher = Arc::new(ToolDispatcher {
            config: config.clone(),
            search: Arc::new(MockSearchProvider),
            image: Arc::new(MockImageProvider),
            sandboxes,
            skill_registry: Arc::new(SkillRegistry::with_builtins()),
            skill_store: Arc::new(ExecutionStore::new(dir.path())),
            interrupts: interrupts.clone(),
            llm: Arc::new(ha_providers::MockProvider::new("mock")),
            http: reqwest::Client::new(),
            command_guard: CommandGuard::new(),
        });

        (
            ToolPipeline::new(config, dispatcher, interrupts.clone()),
            ctx,
            interrupts,
        )
    }

    fn call(tool: &str, args: Value) -> ToolCall {
        ToolCall {
            call_id: "tc_1".into(),
            tool_name: tool.into(),
            arguments: args,
        }
    }

    #[tokio::test]
    async fn low_risk_tool_passes_gate_directly() {
        let (pipeline, ctx, _) = pipeline();
        let outcome = pipeline
            .gate(
                &call("web_search", json!({"query": "x"})),
                &ctx,
                true,
                &HashSet::new(),
            )
            .await;
        assert!(matches!(
            outcome,
            GateOutcome::Proceed {
                approve_always: false
            }
        ));
    }

    #[tokio::test]
    async fn high_risk_tool_waits_for_approval() {
        let (pipeline, ctx, interrupts) = pipeline();
        let pipeline = Arc::new(pipeline);

        let gate = {
            let pipeline = pipeline.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                pipeline
                    .gate(
                        &call("execute_code", json!({"code": "print(1)"})),
                        &ctx,
                        true,
                        &HashSet::new(),
                    )
                    .await
            })
        };

        // Wait for the pending interrupt to appear, then approve it.
        let mut interrupt_id = None;
        for _ in 0..50 {
            if let Some(pending) = interrupts.get_pending_interrupt("t1") {
                interrupt_id = Some(pending.interrupt_id);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let interrupt_id = interrupt_id.expect("no pending interrupt");
        assert!(interrupts.submit_response("t1", &interrupt_id, InterruptAction::Approve, None));

        let outcome = gate.await.unwrap();
        assert!(matches!(
            outcome,
            GateOutcome::Proceed {
                approve_always: false
            }
        ));
    }

    #[tokio::test]
    async fn denied_approval_short_circuits() {
        let (pipeline, ctx, interrupts) = pipeline();
        let pipeline = Arc::new(pipeline);

        let gate = {
            let pipeline = pipeline.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                pipeline
                    .gate(
                        &call("execute_code", json!({"code": "print(1)"})),
                        &ctx,
                        true,
                        &HashSet::new(),
                    )
                    .await
            })
        };

        let mut interrupt_id = None;
        for _ in 0..50 {
            if let Some(pending) = interrupts.get_pending_interrupt("t1") {
                interrupt_id = Some(pending.interrupt_id);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        interrupts.submit_response(
            "t1",
            &interrupt_id.expect("no pending interrupt"),
            InterruptAction::Deny,
            None,
        );

        match gate.await.unwrap() {
            GateOutcome::Denied { message } => {
                assert_eq!(message, "User denied execution");
            }
            _ => panic!("expected denial"),
        }
    }

    #[tokio::test]
    async fn approve_always_is_reported() {
        let (pipeline, ctx, interrupts) = pipeline();
        let pipeline = Arc::new(pipeline);

        let gate = {
            let pipeline = pipeline.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                pipeline
                    .gate(
                        &call("execute_code", json!({"code": "print(1)"})),
                        &ctx,
                        true,
                        &HashSet::new(),
                    )
                    .await
            })
        };

        let mut interrupt_id = None;
        for _ in 0..50 {
            if let Some(pending) = interrupts.get_pending_interrupt("t1") {
                interrupt_id = Some(pending.interrupt_id);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        interrupts.submit_response(
            "t1",
            &interrupt_id.expect("no pending interrupt"),
            InterruptAction::ApproveAlways,
            None,
        );

        assert!(matches!(
            gate.await.unwrap(),
            GateOutcome::Proceed {
                approve_always: true
            }
        ));
    }

    #[tokio::test]
    async fn auto_approved_tool_skips_gate() {
        let (pipeline, ctx, _) = pipeline();
        let mut auto = HashSet::new();
        auto.insert("execute_code".to_string());

        let outcome = pipeline
            .gate(
                &call("execute_code", json!({"code": "print(1)"})),
                &ctx,
                true,
                &auto,
            )
            .await;
        assert!(matches!(outcome, GateOutcome::Proceed { .. }));
    }

    #[tokio::test]
    async fn input_guardrails_block_bad_urls_in_execute() {
        let (pipeline, ctx, _) = pipeline();
        let (content, is_error) = pipeline
            .execute_once(
                &call("http_request", json!({"url": "http://127.0.0.1/x", "method": "GET"})),
                &ctx,
            )
            .await;
        assert!(is_error);
        assert!(content.contains("rejected"));
    }

    #[tokio::test]
    async fn post_process_redacts_and_truncates() {
        let (pipeline, _, _) = pipeline();
        let noisy = format!("email bob@example.com {}", "z".repeat(20_000));
        let out = pipeline.post_process(&noisy);
        assert!(out.contains("[REDACTED_EMAIL]"));
        assert!(out.contains("[output truncated]"));
        assert!(out.len() <= 16_384 + 64);
    }
}
