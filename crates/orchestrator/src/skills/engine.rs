//! The skill engine: look up → validate → record → run the step graph →
//! persist. Intermediate events stream to the task channel; the whole
//! execution is bounded by the skill's declared timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use ha_domain::event::{Event, StageStatus};
use ha_domain::{Error, Message, Result};
use ha_providers::{ChatRequest, LlmProvider};
use ha_skills::graph::{render_string, render_template, SkillStep};
use ha_skills::{validate_params, ExecutionStore, SkillExecution, SkillRegistry};

use crate::runtime::tools::ToolContext;
use futures_util::StreamExt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool seam
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How the engine reaches tools. Implemented by the tool dispatcher so
/// skill tool-steps go through the same pipeline as agent tool calls.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Returns `(content, is_error)`.
    async fn run_tool(&self, tool: &str, args: &Value, ctx: &ToolContext) -> (String, bool);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SkillEngine {
    pub registry: Arc<SkillRegistry>,
    pub store: Arc<ExecutionStore>,
    pub provider: Arc<dyn LlmProvider>,
    pub model: Option<String>,
}

/// Execute a skill end to end. Returns the skill's output object.
pub async fn execute_skill(
    engine: &SkillEngine,
    runner: &dyn ToolRunner,
    ctx: &ToolContext,
    skill_id: &str,
    params: &Value,
) -> Result<Value> {
    // 1. Lookup (enforces ownership/enabled).
    let skill = engine.registry.get_for_user(skill_id, &ctx.user_id)?;

    // 2. Validate before anything with side effects happens.
    let params = validate_params(&skill.definition, params)?;

    // 3. Record the execution.
    let execution = SkillExecution::start(
        skill_id,
        ctx.user_id.clone(),
        Some(ctx.task_id.clone()),
        params.clone(),
    );
    let execution_id = engine.store.insert(execution);

    // 4. Announce the stage.
    let stage_name = format!("skill_{skill_id}");
    ctx.reporter
        .emit(Event::Stage {
            name: stage_name.clone(),
            description: format!("Executing {}", skill.definition.name),
            status: StageStatus::Running,
        })
        .await;

    tracing::info!(
        skill_id = skill_id,
        execution_id = %execution_id,
        user_id = %ctx.user_id,
        "skill execution started"
    );

    // 5. Run the graph, bounded by the declared timeout.
    let timeout = Duration::from_secs(skill.definition.max_execution_time_seconds);
    let outcome = tokio::time::timeout(
        timeout,
        run_graph(engine, runner, ctx, &skill.graph, &params),
    )
    .await
    .unwrap_or_else(|_| {
        Err(Error::Timeout(format!(
            "skill execution timed out after {}s",
            skill.definition.max_execution_time_seconds
        )))
    });

    match outcome {
        Ok(output) => {
            engine
                .store
                .update(&execution_id, |e| e.finish_success(output.clone()));
            if let Some(record) = engine.store.get(&execution_id) {
                engine.store.persist(&record);
            }

            ctx.reporter
                .emit(Event::Stage {
                    name: stage_name,
                    description: format!("Completed {}", skill.definition.name),
                    status: StageStatus::Completed,
                })
                .await;
            ctx.reporter
                .emit(Event::SkillOutput {
                    skill_id: skill_id.to_string(),
                    output: output.clone(),
                })
                .await;

            Ok(output)
        }
        Err(e) => {
            let message = e.to_string();
            engine
                .store
                .update(&execution_id, |rec| rec.finish_failure(message.clone()));
            if let Some(record) = engine.store.get(&execution_id) {
                engine.store.persist(&record);
            }

            ctx.reporter
                .emit(Event::Stage {
                    name: stage_name,
                    description: format!("Failed {}", skill.definition.name),
                    status: StageStatus::Failed,
                })
                .await;
            ctx.reporter
                .emit(Event::Error {
                    message: message.clone(),
                    name: Some(skill.definition.name.clone()),
                })
                .await;

            tracing::error!(skill_id = skill_id, error = %message, "skill execution failed");
            Err(e)
        }
    }
}

async fn run_graph(
    engine: &SkillEngine,
    runner: &dyn ToolRunner,
    ctx: &ToolContext,
    graph: &ha_skills::SkillGraph,
    params: &Value,
) -> Result<Value> {
    let mut outputs: Map<String, Value> = Map::new();

    for step in &graph.steps {
        match step {
            SkillStep::ModelCall {
                id,
                prompt,
                system,
                stream,
                save_as,
            } => {
                let rendered = render_string(prompt, params, &outputs);
                let prompt_text = match rendered {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                let mut messages = Vec::new();
                if let Some(system) = system {
                    messages.push(Message::system(system.clone()));
                }
                messages.push(Message::user(prompt_text));

                let req = ChatRequest {
                    messages,
                    tools: vec![],
                    temperature: Some(0.3),
                    max_tokens: None,
                    json_mode: false,
                    model: engine.model.clone(),
                };

                let text = if *stream {
                    stream_model_call(engine, ctx, &req).await?
                } else {
                    engine.provider.chat(&req).await?.content
                };
                tracing::debug!(step = id.as_str(), chars = text.len(), "model step finished");
                outputs.insert(save_as.clone(), Value::String(text));
            }
            SkillStep::ToolCall {
                id,
                tool,
                args,
                save_as,
            } => {
                let rendered_args = render_template(args, params, &outputs);
                let (content, is_error) = runner.run_tool(tool, &rendered_args, ctx).await;
                if is_error {
                    return Err(Error::Other(format!(
                        "skill step '{id}' failed: {content}"
                    )));
                }
                let value = serde_json::from_str::<Value>(&content)
                    .unwrap_or(Value::String(content));
                outputs.insert(save_as.clone(), value);
            }
            SkillStep::Assemble { output, save_as, .. } => {
                let value = render_template(output, params, &outputs);
                outputs.insert(save_as.clone(), value);
            }
        }
    }

    Ok(render_template(&graph.output, params, &outputs))
}

/// Run a streaming model call, forwarding tokens to the task channel.
async fn stream_model_call(
    engine: &SkillEngine,
    ctx: &ToolContext,
    req: &ChatRequest,
) -> Result<String> {
    let mut stream = engine.provider.chat_stream(req).await?;
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        match event? {
            ha_domain::StreamEvent::Token { text: chunk } => {
                ctx.reporter.emit_token(&chunk).await;
                text.push_str(&chunk);
            }
            ha_domain::StreamEvent::Error { message } => {
                return Err(Error::Other(message));
            }
            _ => {}
        }
    }
    ctx.reporter.flush_tokens().await;
    Ok(text)
}
