//! The supervisor: routes a query to an agent, then drives the agent /
//! handoff state machine until a final response or a terminal error.
//!
//! Handoff tool calls never execute in place — the ReAct driver surfaces
//! them as markers, and this loop validates each hop (matrix, budget,
//! ping-pong), records it, and re-enters the target agent with a fresh
//! query plus the shared-memory snapshot.

use std::sync::Arc;

use ha_domain::backoff::BackoffPolicy;
use ha_domain::config::Config;
use ha_domain::event::Event;
use ha_domain::{Error, Message, Result};
use ha_guardrails::InputScanner;
use ha_providers::{route_query, AgentType, ProviderRegistry};

use super::agent_state::AgentState;
use super::agents::{run_research_agent, run_task_agent, ResearchDepth, ResearchScenario};
use super::cancel::CancelToken;
use super::handoff::{
    build_query_with_context, truncate_shared_memory, HandoffManager,
};
use super::react::{ReactDeps, ReactOutcome};
use super::tools::pipeline::ToolPipeline;
use super::tools::ToolContext;

pub struct SupervisorDeps {
    pub config: Arc<Config>,
    pub llm: Arc<ProviderRegistry>,
    pub pipeline: Arc<ToolPipeline>,
    pub cancel: CancelToken,
    /// Tool retry pacing, threaded into the ReAct driver.
    pub retry: BackoffPolicy,
}

/// Everything the worker knows about the request.
pub struct SupervisorInput {
    pub query: String,
    /// Explicit mode override; `None` consults the classifier.
    pub mode: Option<AgentType>,
    pub depth: ResearchDepth,
    pub scenario: ResearchScenario,
    pub model: Option<String>,
}

/// Drive one request to completion. Returns the final response text.
pub async fn run_supervisor(
    deps: &SupervisorDeps,
    ctx: &ToolContext,
    input: SupervisorInput,
) -> Result<String> {
    // ── Input guardrails ──────────────────────────────────────────
    let scanner = InputScanner::new(&deps.config.guardrails);
    let scan = scanner.scan(&input.query);
    if !scan.passed() {
        return Err(Error::Guardrail(
            scan.reason.unwrap_or_else(|| "query rejected".into()),
        ));
    }

    // ── Routing ───────────────────────────────────────────────────
    let (selected_agent, routing_reason, routing_confidence) = match input.mode {
        Some(agent) => (agent, "explicit mode override".to_string(), 1.0),
        None => {
            let (router_provider, router_model) = deps
                .llm
                .resolve_router()
                .ok_or_else(|| Error::Config("no LLM providers configured".into()))?;
            let decision = route_query(
                router_provider.as_ref(),
                router_model,
                &input.query,
                std::time::Duration::from_secs(deps.config.research.routing_timeout_secs),
            )
            .await;
            (decision.agent, decision.reason, decision.confidence)
        }
    };

    tracing::info!(
        agent = selected_agent.as_str(),
        confidence = routing_confidence,
        "query routed"
    );

    // ── Agent state & handoff tracking ────────────────────────────
    let mut state = AgentState::new(
        input.query.clone(),
        ctx.user_id.clone(),
        ctx.task_id.clone(),
        selected_agent,
    );
    state.routing_reason = routing_reason;
    state.routing_confidence = routing_confidence;
    state.hitl_enabled = deps.config.hitl.enabled;
    state.model = input.model.clone();

    let mut handoffs = HandoffManager::new(selected_agent, deps.config.handoff.max_handoffs);

    let (provider, default_model) = deps
        .llm
        .resolve_executor(input.model.as_deref())
        .ok_or_else(|| Error::Config("no LLM providers configured".into()))?;
    let react_deps = ReactDeps {
        provider,
        model: default_model,
        pipeline: deps.pipeline.clone(),
        config: deps.config.clone(),
        cancel: deps.cancel.clone(),
        retry: deps.retry.clone(),
    };

    // Bound the agent/handoff state machine: every iteration is either a
    // recorded hop, a rejected hop, or terminal. Rejections are bounded by
    // the same budget arithmetic.
    let max_invocations = deps.config.handoff.max_handoffs * 2 + 2;
    for _ in 0..max_invocations {
        if deps.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let outcome = match state.active_agent {
            AgentType::Task => run_task_agent(&react_deps, ctx, &mut state).await?,
            AgentType::Research => {
                run_research_agent(&react_deps, ctx, &mut state, input.depth, input.scenario)
                    .await?
            }
        };

        let (call_id, target, task_description, context) = match outcome {
            ReactOutcome::Final { response, .. } => return Ok(response),
            ReactOutcome::Handoff {
                call_id,
                target,
                task_description,
                context,
                ..
            } => (call_id, target, task_description, context),
        };

        let source = state.active_agent;
        match handoffs.can_handoff(source, target) {
            Err(rejection) => {
                tracing::warn!(
                    source = source.as_str(),
                    target = target.as_str(),
                    %rejection,
                    "handoff rejected"
                );
                // Reported back to the requesting agent as a tool error.
                state.messages.push(Message::tool_result_with(
                    &call_id,
                    format!("Handoff rejected: {rejection}"),
                    true,
                ));
            }
            Ok(()) => {
                let info = handoffs.record(
                    source,
                    target,
                    task_description.clone(),
                    context.clone(),
                );
                state.handoff_count = handoffs.handoff_count();
                state.handoff_history.push(info);

                ctx.reporter
                    .emit(Event::Handoff {
                        source: source.as_str().into(),
                        target: target.as_str().into(),
                        task: task_description.clone(),
                    })
                    .await;

                // Close out the marker call, then carry context over.
                state.messages.push(Message::tool_result(
                    &call_id,
                    format!("Control transferred to the {} agent", target.as_str()),
                ));

                if !context.is_empty() {
                    state.shared_memory.insert("notes".into(), context.clone());
                }
                truncate_shared_memory(
                    &mut state.shared_memory,
                    deps.config.handoff.shared_memory_budget,
                    deps.config.handoff.shared_memory_min_chars,
                    &deps.config.handoff.shared_memory_priorities,
                );

                let query = build_query_with_context(
                    &task_description,
                    &context,
                    &state.shared_memory,
                    &deps.config.handoff.shared_memory_priorities,
                );
                state.enter_agent(target, query);
            }
        }
    }

    Err(Error::Other(
        "supervisor exceeded its agent invocation bound".into(),
    ))
}
