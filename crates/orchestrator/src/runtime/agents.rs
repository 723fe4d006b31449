//! The two canonical agents.
//!
//! The task agent is one ReAct loop over the full tool surface. The
//! research agent is a staged pipeline — search → analyze → write — with
//! per-stage progress and token streaming, whose search phase is itself a
//! ReAct loop restricted to research tools.

use serde::{Deserialize, Serialize};

use ha_domain::event::StageStatus;
use ha_domain::{Error, Message, Result};
use ha_providers::{AgentType, ChatRequest};

use super::agent_state::AgentState;
use super::react::{run_react_loop, ReactDeps, ReactOutcome};
use super::tools::registry::tools_for_agent;
use super::tools::ToolContext;

use futures_util::StreamExt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Research configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResearchDepth {
    Fast,
    #[default]
    Standard,
    Deep,
}

impl ResearchDepth {
    /// Search-loop iteration budget for this depth.
    pub fn search_iterations(self) -> u32 {
        match self {
            ResearchDepth::Fast => 2,
            ResearchDepth::Standard => 4,
            ResearchDepth::Deep => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResearchScenario {
    #[default]
    Academic,
    Market,
    Technical,
    News,
}

impl ResearchScenario {
    /// Section headings the final report should follow.
    pub fn report_structure(self) -> &'static [&'static str] {
        match self {
            ResearchScenario::Academic => {
                &["Abstract", "Background", "Findings", "Discussion", "References"]
            }
            ResearchScenario::Market => {
                &["Executive Summary", "Market Overview", "Key Players", "Trends", "Outlook"]
            }
            ResearchScenario::Technical => {
                &["Overview", "Architecture", "Trade-offs", "Recommendations", "Sources"]
            }
            ResearchScenario::News => {
                &["Summary", "Timeline", "Key Developments", "Context", "Sources"]
            }
        }
    }
}

/// Progress percentages reached as each research stage starts/finishes.
pub const STEP_PROGRESS: &[(&str, u8)] = &[
    ("search", 25),
    ("analyze", 50),
    ("synthesize", 75),
    ("write", 90),
];

fn progress_for(stage: &str) -> Option<u8> {
    STEP_PROGRESS
        .iter()
        .find(|(name, _)| *name == stage)
        .map(|(_, pct)| *pct)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task agent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const TASK_SYSTEM_PROMPT: &str = "You are a capable assistant that completes user tasks \
using the available tools. Prefer acting over asking; use ask_user only when a decision \
genuinely requires the user. Keep answers concise and concrete.";

pub async fn run_task_agent(
    deps: &ReactDeps,
    ctx: &ToolContext,
    state: &mut AgentState,
) -> Result<ReactOutcome> {
    if state.messages.is_empty() {
        state.messages.push(Message::system(TASK_SYSTEM_PROMPT));
        state.messages.push(Message::user(state.query.clone()));
    }
    run_react_loop(deps, ctx, state, tools_for_agent(AgentType::Task)).await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Research agent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const RESEARCH_SEARCH_PROMPT: &str = "You are a research assistant in the evidence-gathering \
phase. Use web_search to collect sources covering the question from several angles. When you \
have enough material, reply with a bullet list of the key findings (no tool calls).";

pub async fn run_research_agent(
    deps: &ReactDeps,
    ctx: &ToolContext,
    state: &mut AgentState,
    depth: ResearchDepth,
    scenario: ResearchScenario,
) -> Result<ReactOutcome> {
    let reporter = &ctx.reporter;

    // ── Stage 1: search ───────────────────────────────────────────
    reporter
        .emit_stage("search", "Gathering sources", StageStatus::Running)
        .await;

    state.messages.clear();
    state.messages.push(Message::system(RESEARCH_SEARCH_PROMPT));
    state.messages.push(Message::user(state.query.clone()));

    // The search loop gets its own (depth-scaled) iteration budget.
    let mut search_config = (*deps.config).clone();
    search_config.react.max_iterations = depth.search_iterations();
    let search_deps = ReactDeps {
        provider: deps.provider.clone(),
        model: deps.model.clone(),
        pipeline: deps.pipeline.clone(),
        config: std::sync::Arc::new(search_config),
        cancel: deps.cancel.clone(),
        retry: deps.retry.clone(),
    };

    let findings = match run_react_loop(
        &search_deps,
        ctx,
        state,
        tools_for_agent(AgentType::Research),
    )
    .await
    {
        Ok(ReactOutcome::Final { response, .. }) => response,
        Ok(handoff @ ReactOutcome::Handoff { .. }) => {
            // Delegation out of research; the supervisor takes over.
            reporter
                .emit_stage("search", "Gathering sources", StageStatus::Completed)
                .await;
            return Ok(handoff);
        }
        // Search budget exhaustion is not fatal — work with what the
        // transcript already holds.
        Err(Error::BudgetExceeded(_)) => collect_tool_findings(state),
        Err(e) => {
            reporter
                .emit_stage("search", "Gathering sources", StageStatus::Failed)
                .await;
            return Err(e);
        }
    };

    reporter
        .emit_stage("search", "Gathering sources", StageStatus::Completed)
        .await;
    if let Some(pct) = progress_for("search") {
        reporter.emit_progress(pct, Some("search".into())).await;
    }

    // ── Stage 2: analyze ──────────────────────────────────────────
    reporter
        .emit_stage("analyze", "Analyzing findings", StageStatus::Running)
        .await;

    let analysis_prompt = format!(
        "Analyze these research findings for the question below. Identify themes, \
         contradictions, and gaps. Be specific.\n\nQUESTION: {}\n\nFINDINGS:\n{}",
        state.query, findings
    );
    let analysis = match stream_stage_call(deps, ctx, &analysis_prompt).await {
        Ok(analysis) => analysis,
        Err(e) => {
            reporter
                .emit_stage("analyze", "Analyzing findings", StageStatus::Failed)
                .await;
            return Err(e);
        }
    };

    reporter
        .emit_stage("analyze", "Analyzing findings", StageStatus::Completed)
        .await;
    if let Some(pct) = progress_for("analyze") {
        reporter.emit_progress(pct, Some("analyze".into())).await;
    }

    // ── Stage 3: write ────────────────────────────────────────────
    reporter
        .emit_stage("write", "Writing report", StageStatus::Running)
        .await;
    if let Some(pct) = progress_for("synthesize") {
        reporter.emit_progress(pct, Some("synthesize".into())).await;
    }

    let structure = scenario
        .report_structure()
        .iter()
        .map(|s| format!("## {s}"))
        .collect::<Vec<_>>()
        .join("\n");
    let write_prompt = format!(
        "Write the final research report for the question below, using this section \
         structure:\n{structure}\n\nQUESTION: {}\n\nANALYSIS:\n{analysis}\n\nFINDINGS:\n{}",
        state.query, findings
    );
    let report = match stream_stage_call(deps, ctx, &write_prompt).await {
        Ok(report) => report,
        Err(e) => {
            reporter
                .emit_stage("write", "Writing report", StageStatus::Failed)
                .await;
            return Err(e);
        }
    };

    reporter
        .emit_stage("write", "Writing report", StageStatus::Completed)
        .await;
    if let Some(pct) = progress_for("write") {
        reporter.emit_progress(pct, Some("write".into())).await;
    }

    Ok(ReactOutcome::Final {
        response: report,
        usage: Default::default(),
    })
}

/// Pull raw tool results out of the transcript when the search loop burned
/// its budget before summarizing.
fn collect_tool_findings(state: &AgentState) -> String {
    let mut findings = String::new();
    for message in &state.messages {
        if message.role == ha_domain::Role::Tool {
            if let ha_domain::MessageContent::Parts(parts) = &message.content {
                for part in parts {
                    if let ha_domain::ContentPart::ToolResult {
                        content,
                        is_error: false,
                        ..
                    } = part
                    {
                        findings.push_str(content);
                        findings.push('\n');
                    }
                }
            }
        }
    }
    findings
}

/// One streaming model call whose tokens go to the task channel.
async fn stream_stage_call(deps: &ReactDeps, ctx: &ToolContext, prompt: &str) -> Result<String> {
    let req = ChatRequest {
        messages: vec![Message::user(prompt)],
        tools: vec![],
        temperature: Some(0.3),
        max_tokens: None,
        json_mode: false,
        model: deps.model.clone(),
    };

    let timeout = std::time::Duration::from_secs(deps.config.react.model_timeout_secs);
    let consume = async {
        let mut stream = deps.provider.chat_stream(&req).await?;
        let mut text = String::new();
        loop {
            let event = tokio::select! {
                _ = deps.cancel.cancelled() => return Err(Error::Cancelled),
                event = stream.next() => event,
            };
            let Some(event) = event else { break };
            match event? {
                ha_domain::StreamEvent::Token { text: chunk } => {
                    ctx.reporter.emit_token(&chunk).await;
                    text.push_str(&chunk);
                }
                ha_domain::StreamEvent::Error { message } => {
                    return Err(Error::Provider {
                        provider: deps.provider.provider_id().to_string(),
                        message,
                    });
                }
                _ => {}
            }
        }
        ctx.reporter.flush_tokens().await;
        Ok(text)
    };

    match tokio::time::timeout(timeout, consume).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "model call timed out after {}s",
            timeout.as_secs()
        ))),
    }
}
