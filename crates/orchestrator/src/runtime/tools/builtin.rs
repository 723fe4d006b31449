//! Builtin tool dispatchers.
//!
//! Every dispatcher returns `(result_content, is_error)`; errors become
//! tool-result messages the model can react to, never panics. Context
//! fields (user_id, task_id) are injected by the orchestrator — the model
//! cannot spoof them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use ha_domain::config::Config;
use ha_domain::event::Event;
use ha_guardrails::{validate_url, CommandGuard};
use ha_providers::LlmProvider;
use ha_sandbox::{BrowserAction, ExecRequest, FileOperation, SandboxManagerSet};
use ha_skills::{ExecutionStore, SkillRegistry};

use crate::runtime::interrupt::{InterruptAction, InterruptManager};
use crate::skills::engine::{execute_skill, SkillEngine, ToolRunner};

use super::external::{ImageProvider, SearchProvider};
use super::ToolContext;

pub struct ToolDispatcher {
    pub config: Arc<Config>,
    pub search: Arc<dyn SearchProvider>,
    pub image: Arc<dyn ImageProvider>,
    pub sandboxes: Arc<SandboxManagerSet>,
    pub skill_registry: Arc<SkillRegistry>,
    pub skill_store: Arc<ExecutionStore>,
    pub interrupts: Arc<InterruptManager>,
    pub llm: Arc<dyn LlmProvider>,
    pub http: reqwest::Client,
    pub command_guard: CommandGuard,
}

impl ToolDispatcher {
    /// Dispatch a single tool call. Returns `(result_content, is_error)`.
    pub async fn dispatch(&self, tool_name: &str, args: &Value, ctx: &ToolContext) -> (String, bool) {
        match tool_name {
            "web_search" => self.dispatch_web_search(args, ctx).await,
            "http_request" => self.dispatch_http_request(args).await,
            "execute_code" => self.dispatch_execute_code(args, ctx).await,
            "sandbox_file" => self.dispatch_sandbox_file(args, ctx).await,
            "generate_image" => self.dispatch_generate_image(args, ctx).await,
            "analyze_image" => stub_tool(
                "analyze_image",
                "Image analysis requires a vision-capable provider; none is configured.",
            ),
            "ask_user" => self.dispatch_ask_user(args, ctx).await,
            "invoke_skill" => self.dispatch_invoke_skill(args, ctx).await,
            name if name.starts_with("browser_") => self.dispatch_browser(name, args, ctx).await,
            other => (
                json!({
                    "error": format!("Unknown tool: '{other}'"),
                    "message": "This tool is not registered. Check available tools.",
                })
                .to_string(),
                true,
            ),
        }
    }

    // ── web_search ────────────────────────────────────────────────

    async fn dispatch_web_search(&self, args: &Value, ctx: &ToolContext) -> (String, bool) {
        let query = match args.get("query").and_then(|v| v.as_str()) {
            Some(q) if !q.is_empty() => q,
            _ => return ("missing required argument: query".into(), true),
        };
        let max_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(5)
            .clamp(1, 20) as usize;
        let advanced = args
            .get("search_depth")
            .and_then(|v| v.as_str())
            .map(|d| d == "advanced")
            .unwrap_or(false);

        let timeout = Duration::from_secs(self.config.tools.search_timeout_secs);
        let results = match tokio::time::timeout(
            timeout,
            self.search.search(query, max_results, advanced),
        )
        .await
        {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => return (format!("search failed: {e}"), true),
            Err(_) => {
                return (
                    format!("search timed out after {}s", timeout.as_secs()),
                    true,
                )
            }
        };

        // Surface findings to the stream as they are discovered.
        for result in &results {
            ctx.reporter
                .emit(Event::Source {
                    title: result.title.clone(),
                    url: result.url.clone(),
                    snippet: Some(result.snippet.clone()),
                    relevance_score: result.relevance_score,
                })
                .await;
        }

        let formatted = results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("[{}] {} — {}\n{}", i + 1, r.title, r.url, r.snippet))
            .collect::<Vec<_>>()
            .join("\n\n");

        (
            json!({
                "query": query,
                "formatted": formatted,
                "results": results,
            })
            .to_string(),
            false,
        )
    }

    // ── http_request ──────────────────────────────────────────────

    async fn dispatch_http_request(&self, args: &Value) -> (String, bool) {
        let url = match args.get("url").and_then(|v| v.as_str()) {
            Some(u) => u,
            None => return ("missing required argument: url".into(), true),
        };
        let method = args
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("GET")
            .to_uppercase();

        let scan = validate_url(url, &self.config.guardrails.blocked_domains);
        if !scan.passed() {
            return (
                format!(
                    "URL rejected: {}",
                    scan.reason.unwrap_or_else(|| "invalid URL".into())
                ),
                true,
            );
        }

        let method = match reqwest::Method::from_bytes(method.as_bytes()) {
            Ok(m) => m,
            Err(_) => return (format!("invalid method: {method}"), true),
        };
        let timeout = args
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.config.tools.http_timeout_secs)
            .clamp(1, 120);

        let mut request = self
            .http
            .request(method, url)
            .timeout(Duration::from_secs(timeout));
        if let Some(headers) = args.get("headers").and_then(|v| v.as_object()) {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(key, value);
                }
            }
        }
        if let Some(body) = args.get("body").and_then(|v| v.as_str()) {
            request = request.body(body.to_string());
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                let truncated = ha_guardrails::truncate_result(
                    &body,
                    self.config.guardrails.result_max_bytes,
                );
                (
                    json!({
                        "status": status,
                        "body": truncated,
                    })
                    .to_string(),
                    status >= 400,
                )
            }
            Err(e) => (format!("http request failed: {e}"), true),
        }
    }

    // ── execute_code ──────────────────────────────────────────────

    async fn dispatch_execute_code(&self, args: &Value, ctx: &ToolContext) -> (String, bool) {
        let code = match args.get("code").and_then(|v| v.as_str()) {
            Some(c) if !c.is_empty() => c,
            _ => return ("missing required argument: code".into(), true),
        };
        let language = args
            .get("language")
            .and_then(|v| v.as_str())
            .unwrap_or("python");
        if !matches!(language, "python" | "javascript" | "typescript" | "bash") {
            return (format!("unsupported language: {language}"), true);
        }

        let scan = self.command_guard.scan(code);
        if !scan.passed() {
            return (
                scan.reason
                    .unwrap_or_else(|| "code rejected by guardrails".into()),
                true,
            );
        }

        let timeout = args
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.config.tools.code_timeout_secs)
            .clamp(1, 600);
        let packages = args
            .get("packages")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|p| p.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        let capture = args
            .get("capture_visualizations")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let session = match self
            .sandboxes
            .execution
            .get_or_create(Some(&ctx.user_id), Some(&ctx.task_id), None)
            .await
        {
            Ok(session) => session,
            Err(e) => return (format!("sandbox unavailable: {e}"), true),
        };

        let request = ExecRequest {
            code: code.to_string(),
            language: language.to_string(),
            packages,
            capture_visualizations: capture,
            timeout_secs: timeout,
        };

        match session.executor.exec(request).await {
            Ok(output) => {
                for (index, viz) in output.visualizations.iter().enumerate() {
                    ctx.reporter
                        .emit(Event::Image {
                            data_base64: Some(viz.clone()),
                            url: None,
                            mime_type: "image/png".into(),
                            index: index as u32,
                        })
                        .await;
                }
                let success = output.exit_code.unwrap_or(0) == 0;
                (
                    json!({
                        "success": success,
                        "stdout": output.stdout,
                        "stderr": output.stderr,
                        "exit_code": output.exit_code,
                        "visualizations": output.visualizations,
                    })
                    .to_string(),
                    !success,
                )
            }
            Err(e) => (format!("code execution failed: {e}"), true),
        }
    }

    // ── sandbox_file ──────────────────────────────────────────────

    async fn dispatch_sandbox_file(&self, args: &Value, ctx: &ToolContext) -> (String, bool) {
        let operation: FileOperation = match serde_json::from_value(args.clone()) {
            Ok(op) => op,
            Err(e) => return (format!("invalid sandbox_file arguments: {e}"), true),
        };

        let session = match self
            .sandboxes
            .execution
            .get_or_create(Some(&ctx.user_id), Some(&ctx.task_id), None)
            .await
        {
            Ok(session) => session,
            Err(e) => return (format!("sandbox unavailable: {e}"), true),
        };

        match session.executor.file_op(operation).await {
            Ok(result) => {
                let is_error = !result.success;
                (
                    serde_json::to_string(&result).unwrap_or_else(|_| "{}".into()),
                    is_error,
                )
            }
            Err(e) => (format!("file operation failed: {e}"), true),
        }
    }

    // ── generate_image ────────────────────────────────────────────

    async fn dispatch_generate_image(&self, args: &Value, ctx: &ToolContext) -> (String, bool) {
        let prompt = match args.get("prompt").and_then(|v| v.as_str()) {
            Some(p) if !p.is_empty() => p,
            _ => return ("missing required argument: prompt".into(), true),
        };
        let size = args
            .get("size")
            .and_then(|v| v.as_str())
            .unwrap_or("1024x1024");
        let n = args.get("n").and_then(|v| v.as_u64()).unwrap_or(1).clamp(1, 4) as usize;
        let quality = args
            .get("quality")
            .and_then(|v| v.as_str())
            .unwrap_or("standard");

        match self.image.generate(prompt, size, n, quality).await {
            Ok(images) => {
                for (index, image) in images.iter().enumerate() {
                    ctx.reporter
                        .emit(Event::Image {
                            data_base64: image.data_base64.clone(),
                            url: image.url.clone(),
                            mime_type: image.mime_type.clone(),
                            index: index as u32,
                        })
                        .await;
                }
                (
                    json!({
                        "success": true,
                        "images": images,
                        "prompt": prompt,
                    })
                    .to_string(),
                    false,
                )
            }
            Err(e) => (format!("image generation failed: {e}"), true),
        }
    }

    // ── browser_* ─────────────────────────────────────────────────

    async fn dispatch_browser(
        &self,
        tool_name: &str,
        args: &Value,
        ctx: &ToolContext,
    ) -> (String, bool) {
        let action = match tool_name {
            "browser_navigate" => {
                let url = match args.get("url").and_then(|v| v.as_str()) {
                    Some(u) => u,
                    None => return ("missing required argument: url".into(), true),
                };
                let scan = validate_url(url, &self.config.guardrails.blocked_domains);
                if !scan.passed() {
                    return (
                        format!(
                            "URL rejected: {}",
                            scan.reason.unwrap_or_else(|| "invalid URL".into())
                        ),
                        true,
                    );
                }
                BrowserAction::Navigate { url: url.into() }
            }
            "browser_click" => BrowserAction::Click {
                x: args.get("x").and_then(|v| v.as_i64()).unwrap_or(0) as i32,
                y: args.get("y").and_then(|v| v.as_i64()).unwrap_or(0) as i32,
            },
            "browser_type" => BrowserAction::TypeText {
                text: args
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .into(),
            },
            "browser_press_key" => BrowserAction::PressKey {
                key: args
                    .get("key")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Enter")
                    .into(),
            },
            "browser_scroll" => BrowserAction::Scroll {
                dx: args.get("dx").and_then(|v| v.as_i64()).unwrap_or(0) as i32,
                dy: args.get("dy").and_then(|v| v.as_i64()).unwrap_or(0) as i32,
            },
            "browser_screenshot" => BrowserAction::Screenshot,
            other => return (format!("unknown browser tool: {other}"), true),
        };

        let session = match self
            .sandboxes
            .desktop
            .get_or_create(Some(&ctx.user_id), Some(&ctx.task_id), None)
            .await
        {
            Ok(session) => session,
            Err(e) => return (format!("desktop sandbox unavailable: {e}"), true),
        };

        // Announce the live feed once per navigate.
        if matches!(action, BrowserAction::Navigate { .. }) {
            if let Some(info) = session.executor.stream_info() {
                ctx.reporter
                    .emit(Event::BrowserStream {
                        stream_url: info.stream_url,
                        sandbox_id: session.sandbox_id.clone(),
                        auth_key: info.auth_key,
                    })
                    .await;
            }
        }

        match session.executor.browser_action(action).await {
            Ok(output) => (output, false),
            Err(e) => (format!("browser action failed: {e}"), true),
        }
    }

    // ── ask_user ──────────────────────────────────────────────────

    async fn dispatch_ask_user(&self, args: &Value, ctx: &ToolContext) -> (String, bool) {
        let question = match args.get("question").and_then(|v| v.as_str()) {
            Some(q) if !q.is_empty() => q,
            _ => return ("missing required argument: question".into(), true),
        };
        let question_type = args
            .get("question_type")
            .and_then(|v| v.as_str())
            .unwrap_or("input");
        let context = args.get("context").and_then(|v| v.as_str());

        let message = match context {
            Some(context) => format!("{context}\n\n{question}"),
            None => question.to_string(),
        };

        // Confirmation questions become a yes/no decision.
        let (kind, options) = match question_type {
            "decision" => {
                let options: Option<Vec<ha_domain::event::InterruptOption>> = args
                    .get("options")
                    .and_then(|v| serde_json::from_value(v.clone()).ok());
                match options {
                    Some(options) if !options.is_empty() => {
                        (ha_domain::event::InterruptKind::Decision, Some(options))
                    }
                    _ => return ("decision questions require options".into(), true),
                }
            }
            "confirmation" => (
                ha_domain::event::InterruptKind::Decision,
                Some(vec![
                    ha_domain::event::InterruptOption {
                        label: "Yes".into(),
                        value: "yes".into(),
                        description: Some("Proceed with the action".into()),
                    },
                    ha_domain::event::InterruptOption {
                        label: "No".into(),
                        value: "no".into(),
                        description: Some("Cancel the action".into()),
                    },
                ]),
            ),
            _ => (ha_domain::event::InterruptKind::Input, None),
        };

        let timeout = Duration::from_secs(self.config.hitl.decision_timeout_secs);
        let interrupt = crate::runtime::interrupt::Interrupt::new(
            ctx.thread_id.clone(),
            kind,
            "Agent Question",
            message.clone(),
            options.clone(),
            timeout.as_secs(),
        );
        let interrupt_id = interrupt.interrupt_id.clone();

        self.interrupts.create_interrupt(interrupt);
        ctx.reporter
            .emit(Event::Interrupt {
                interrupt_id: interrupt_id.clone(),
                title: "Agent Question".into(),
                message,
                options,
                kind,
            })
            .await;

        match self
            .interrupts
            .wait_for_response(&ctx.thread_id, &interrupt_id, timeout)
            .await
        {
            Ok(response) => match response.action {
                InterruptAction::Skip => ("skipped".into(), false),
                InterruptAction::Select | InterruptAction::Input => (
                    response.value.unwrap_or_else(|| "skipped".into()),
                    false,
                ),
                InterruptAction::Approve => ("yes".into(), false),
                InterruptAction::Deny => ("no".into(), false),
                InterruptAction::Cancel => ("cancelled".into(), false),
                InterruptAction::ApproveAlways => ("yes".into(), false),
            },
            Err(_) => ("timeout".into(), false),
        }
    }

    // ── invoke_skill ──────────────────────────────────────────────

    async fn dispatch_invoke_skill(&self, args: &Value, ctx: &ToolContext) -> (String, bool) {
        let skill_id = match args.get("skill_id").and_then(|v| v.as_str()) {
            Some(id) => id,
            None => return ("missing required argument: skill_id".into(), true),
        };
        let params = args.get("params").cloned().unwrap_or(json!({}));

        let engine = SkillEngine {
            registry: self.skill_registry.clone(),
            store: self.skill_store.clone(),
            provider: self.llm.clone(),
            model: None,
        };

        match execute_skill(&engine, self, ctx, skill_id, &params).await {
            Ok(output) => (output.to_string(), false),
            Err(e) => (format!("skill invocation failed: {e}"), true),
        }
    }
}

#[async_trait]
impl ToolRunner for ToolDispatcher {
    async fn run_tool(&self, tool: &str, args: &Value, ctx: &ToolContext) -> (String, bool) {
        self.dispatch(tool, args, ctx).await
    }
}

fn stub_tool(name: &str, message: &str) -> (String, bool) {
    (
        json!({
            "error": format!("Tool '{name}' is not available"),
            "message": message,
        })
        .to_string(),
        true,
    )
}

/// Per-tool execution timeout (outer bound around dispatch).
pub fn tool_timeout(config: &Config, tool_name: &str) -> Duration {
    let secs = match tool_name {
        "http_request" => config.tools.http_timeout_secs.saturating_add(5),
        "execute_code" => config.tools.code_timeout_secs.saturating_add(10),
        "web_search" => config.tools.search_timeout_secs.saturating_add(5),
        name if name.starts_with("browser_") => config.tools.shell_timeout_secs,
        "ask_user" | "invoke_skill" => {
            // These block on user decisions / nested graphs; bound by their
            // own internal timeouts plus slack.
            return Duration::from_secs(
                config
                    .hitl
                    .decision_timeout_secs
                    .max(config.skills.default_timeout_secs)
                    .saturating_add(30),
            );
        }
        _ => 60,
    };
    Duration::from_secs(secs)
}

/// Keys whose dispatch has no side effects outside its own call.
pub fn is_side_effect_free(tool_name: &str) -> bool {
    matches!(tool_name, "web_search" | "analyze_image")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_bus::{MemoryBus, ProgressReporter};
    use ha_sandbox::SandboxManager;

    use crate::runtime::tools::external::{MockImageProvider, MockSearchProvider};

    fn sandbox_set() -> Arc<SandboxManagerSet> {
        use ha_sandbox::SandboxKind;

        struct NoRuntime(SandboxKind);

        #[async_trait]
        impl ha_sandbox::SandboxRuntime for NoRuntime {
            fn kind(&self) -> SandboxKind {
                self.0
            }
            async fn create(&self) -> ha_domain::Result<Box<dyn ha_sandbox::Sandbox>> {
                Err(ha_domain::Error::Sandbox("no provider configured".into()))
            }
        }

        Arc::new(SandboxManagerSet {
            execution: SandboxManager::new(
                Arc::new(NoRuntime(SandboxKind::Execution)),
                Duration::from_secs(600),
                4,
            ),
            desktop: SandboxManager::new(
                Arc::new(NoRuntime(SandboxKind::Desktop)),
                Duration::from_secs(600),
                4,
            ),
            app: SandboxManager::new(
                Arc::new(NoRuntime(SandboxKind::App)),
                Duration::from_secs(600),
                4,
            ),
        })
    }

    fn dispatcher() -> (ToolDispatcher, ToolContext) {
        let bus = Arc::new(MemoryBus::new());
        let reporter = Arc::new(ProgressReporter::new(bus, "t1"));
        let ctx = ToolContext::new("u1", "t1", reporter);
        let dir = tempfile::tempdir().unwrap();
        let provider = ha_providers::MockProvider::new("mock");

        let dispatcher = ToolDispatcher {
            config: Arc::new(Config::default()),
            search: Arc::new(MockSearchProvider),
            image: Arc::new(MockImageProvider),
            sandboxes: sandbox_set(),
            skill_registry: Arc::new(SkillRegistry::with_builtins()),
            skill_store: Arc::new(ExecutionStore::new(dir.path())),
            interrupts: Arc::new(InterruptManager::new()),
            llm: Arc::new(provider),
            http: reqwest::Client::new(),
            command_guard: CommandGuard::new(),
        };
        (dispatcher, ctx)
    }

    #[tokio::test]
    async fn web_search_returns_formatted_results() {
        let (dispatcher, ctx) = dispatcher();
        let (content, is_error) = dispatcher
            .dispatch("web_search", &json!({"query": "rust"}), &ctx)
            .await;
        assert!(!is_error, "{content}");
        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["query"], "rust");
        assert!(parsed["results"].as_array().unwrap().len() >= 1);
    }

    #[tokio::test]
    async fn web_search_requires_query() {
        let (dispatcher, ctx) = dispatcher();
        let (content, is_error) = dispatcher.dispatch("web_search", &json!({}), &ctx).await;
        assert!(is_error);
        assert!(content.contains("query"));
    }

    #[tokio::test]
    async fn http_request_rejects_private_urls() {
        let (dispatcher, ctx) = dispatcher();
        let (content, is_error) = dispatcher
            .dispatch(
                "http_request",
                &json!({"url": "http://169.254.169.254/latest", "method": "GET"}),
                &ctx,
            )
            .await;
        assert!(is_error);
        assert!(content.contains("rejected"));
    }

    #[tokio::test]
    async fn execute_code_blocks_dangerous_patterns() {
        let (dispatcher, ctx) = dispatcher();
        let (content, is_error) = dispatcher
            .dispatch(
                "execute_code",
                &json!({"code": "rm -rf / --no-preserve-root", "language": "bash"}),
                &ctx,
            )
            .await;
        assert!(is_error);
        assert!(content.contains("dangerous"));
    }

    #[tokio::test]
    async fn execute_code_surfaces_sandbox_failure() {
        let (dispatcher, ctx) = dispatcher();
        let (content, is_error) = dispatcher
            .dispatch(
                "execute_code",
                &json!({"code": "print(1)", "language": "python"}),
                &ctx,
            )
            .await;
        assert!(is_error);
        assert!(content.contains("sandbox unavailable"));
    }

    #[tokio::test]
    async fn unknown_tool_reports_error() {
        let (dispatcher, ctx) = dispatcher();
        let (content, is_error) = dispatcher.dispatch("quantum_leap", &json!({}), &ctx).await;
        assert!(is_error);
        assert!(content.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn generate_image_returns_images() {
        let (dispatcher, ctx) = dispatcher();
        let (content, is_error) = dispatcher
            .dispatch("generate_image", &json!({"prompt": "a cat", "n": 2}), &ctx)
            .await;
        assert!(!is_error);
        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["images"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn invoke_skill_missing_param_is_error() {
        let (dispatcher, ctx) = dispatcher();
        let (content, is_error) = dispatcher
            .dispatch(
                "invoke_skill",
                &json!({"skill_id": "web_research", "params": {}}),
                &ctx,
            )
            .await;
        assert!(is_error);
        assert!(content.contains("missing required parameter"));
    }

    #[tokio::test]
    async fn ask_user_decision_requires_options() {
        let (dispatcher, ctx) = dispatcher();
        let (content, is_error) = dispatcher
            .dispatch(
                "ask_user",
                &json!({"question": "pick one", "question_type": "decision"}),
                &ctx,
            )
            .await;
        assert!(is_error);
        assert!(content.contains("options"));
    }

    #[test]
    fn tool_timeouts_are_tool_specific() {
        let config = Config::default();
        assert!(tool_timeout(&config, "execute_code") > tool_timeout(&config, "web_search"));
        assert!(tool_timeout(&config, "ask_user") >= Duration::from_secs(300));
    }

    #[test]
    fn side_effect_free_classification() {
        assert!(is_side_effect_free("web_search"));
        assert!(!is_side_effect_free("execute_code"));
        assert!(!is_side_effect_free("sandbox_file"));
    }
}
