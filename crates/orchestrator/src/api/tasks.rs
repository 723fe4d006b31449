//! Task API — submit, list, get, cancel, and stream.
//!
//! - `POST   /v1/tasks`            — create a task row and enqueue its job
//! - `GET    /v1/tasks`            — list tasks (filter by user, status)
//! - `GET    /v1/tasks/:id`        — task details
//! - `DELETE /v1/tasks/:id`        — cancel a pending/running task
//! - `GET    /v1/tasks/:id/events` — SSE stream of task progress events

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;

use crate::runtime::queue::{job_id_for, Job, Task, TaskKind, TaskStatus};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / query shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub query: String,
    #[serde(default = "d_kind")]
    pub kind: TaskKind,
    #[serde(default)]
    pub depth: Option<String>,
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "d_user")]
    pub user_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub priority: i32,
    /// Optional enqueue delay in seconds.
    #[serde(default)]
    pub delay_secs: Option<u64>,
}

fn d_kind() -> TaskKind {
    TaskKind::Task
}
fn d_user() -> String {
    "anonymous".into()
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "d_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn d_limit() -> usize {
    50
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/tasks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<CreateTaskRequest>,
) -> impl IntoResponse {
    if state.llm.is_empty() {
        return (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "no_llm_provider",
                "reason": "No LLM providers are available. Configure at least one \
                           provider in config.toml under [llm.providers].",
            })),
        )
            .into_response();
    }
    if body.query.trim().is_empty() {
        return (
            axum::http::StatusCode::BAD_REQUEST,
            Json(json!({ "error": "query must not be empty" })),
        )
            .into_response();
    }

    // The durable row exists before the job is enqueued.
    let mut task = Task::new(
        body.kind,
        body.query.clone(),
        body.user_id.clone(),
        state.config.queue.max_retries,
    );
    task.priority = body.priority;
    task.project_id = body.project_id.clone();
    let task_id = state.task_store.insert(task);

    let delay = body.delay_secs.unwrap_or(0);
    let job = Job {
        job_id: job_id_for(body.kind, &task_id),
        task_id: task_id.clone(),
        kind: body.kind,
        payload: json!({
            "depth": body.depth,
            "scenario": body.scenario,
            "model": body.model,
        }),
        priority: body.priority,
        ready_at: std::time::Instant::now() + std::time::Duration::from_secs(delay),
    };
    let job_id = state.queue.enqueue(job);

    (
        axum::http::StatusCode::CREATED,
        Json(json!({
            "task_id": task_id,
            "job_id": job_id,
            "status": "pending",
        })),
    )
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/tasks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> impl IntoResponse {
    let status = query.status.as_deref().and_then(parse_status);
    let limit = query.limit.min(200);
    let (tasks, total) = state
        .task_store
        .list(query.user_id.as_deref(), status, limit, query.offset);

    Json(json!({
        "tasks": tasks,
        "total": total,
        "limit": limit,
        "offset": query.offset,
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/tasks/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> impl IntoResponse {
    match state.task_store.get(&task_id) {
        Some(task) => Json(json!(task)).into_response(),
        None => (
            axum::http::StatusCode::NOT_FOUND,
            Json(json!({ "error": "task not found" })),
        )
            .into_response(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /v1/tasks/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> impl IntoResponse {
    let Some(task) = state.task_store.get(&task_id) else {
        return (
            axum::http::StatusCode::NOT_FOUND,
            Json(json!({ "error": "task not found" })),
        )
            .into_response();
    };
    if !state.task_store.cancel(&task_id) {
        return (
            axum::http::StatusCode::CONFLICT,
            Json(json!({
                "error": "task is already in a terminal state",
                "task_id": task_id,
                "cancelled": false,
            })),
        )
            .into_response();
    }

    // Drop the queued job if it never started; abort the run if it did.
    state.queue.remove_pending(&job_id_for(task.kind, &task_id));
    state.cancel_map.cancel(&task_id);
    state.task_store.persist_current(&task_id);

    Json(json!({ "task_id": task_id, "cancelled": true })).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/tasks/:id/events (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn task_events_sse(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> impl IntoResponse {
    let Some(task) = state.task_store.get(&task_id) else {
        let stream = futures_util::stream::once(async {
            Ok::<_, std::convert::Infallible>(
                SseEvent::default()
                    .event("error")
                    .data(r#"{"error":"task not found"}"#),
            )
        });
        return Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    };

    // Terminal task: replay the stored snapshot and close. The broker is a
    // late-arrival bus, so history lives in the row, not the channel.
    if task.status.is_terminal() {
        let data = serde_json::to_string(&task).unwrap_or_default();
        let stream = futures_util::stream::once(async move {
            Ok::<_, std::convert::Infallible>(
                SseEvent::default().event("task.snapshot").data(data),
            )
        });
        return Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    }

    // Live stream; a pending interrupt (if any) is rehydrated first so
    // reconnecting clients can re-render the approval dialog.
    let pending = state.interrupts.get_pending_interrupt(&task_id);
    let bus_stream = state.bus.subscribe(&ha_bus::progress_channel(&task_id)).await;
    let stream = make_event_stream(pending, bus_stream);
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn make_event_stream(
    pending: Option<crate::runtime::Interrupt>,
    mut bus_stream: ha_domain::stream::BoxStream<'static, String>,
) -> impl Stream<Item = Result<SseEvent, std::convert::Infallible>> {
    async_stream::stream! {
        if let Some(interrupt) = pending {
            let data = serde_json::to_string(&interrupt).unwrap_or_default();
            yield Ok(SseEvent::default().event("interrupt.pending").data(data));
        }
        while let Some(payload) = bus_stream.next().await {
            // Terminal detection on the envelope's type discriminator.
            let is_terminal = serde_json::from_str::<ha_domain::EventEnvelope>(&payload)
                .map(|env| env.event.is_terminal())
                .unwrap_or(false);
            yield Ok(SseEvent::default().data(payload));
            if is_terminal {
                break;
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/queue/stats
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn queue_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "pending_jobs": state.queue.pending_count(),
        "running_jobs": state.queue.running_count(),
        "task_counts": state.task_store.status_counts(),
    }))
}

fn parse_status(s: &str) -> Option<TaskStatus> {
    match s {
        "pending" => Some(TaskStatus::Pending),
        "running" => Some(TaskStatus::Running),
        "completed" => Some(TaskStatus::Completed),
        "failed" => Some(TaskStatus::Failed),
        "cancelled" => Some(TaskStatus::Cancelled),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing() {
        assert_eq!(parse_status("running"), Some(TaskStatus::Running));
        assert_eq!(parse_status("nope"), None);
    }

    #[test]
    fn create_request_defaults() {
        let body: CreateTaskRequest =
            serde_json::from_str(r#"{"query": "hello"}"#).unwrap();
        assert_eq!(body.kind, TaskKind::Task);
        assert_eq!(body.user_id, "anonymous");
        assert_eq!(body.priority, 0);
    }

    #[test]
    fn create_request_research() {
        let body: CreateTaskRequest = serde_json::from_str(
            r#"{"query": "x", "kind": "research", "depth": "fast", "scenario": "academic"}"#,
        )
        .unwrap();
        assert_eq!(body.kind, TaskKind::Research);
        assert_eq!(body.depth.as_deref(), Some("fast"));
    }
}
