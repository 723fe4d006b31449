//! Route table and edge middleware (CORS, tracing, rate limiting).

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::rate_limit::{client_id, RateDecision};
use super::{hitl, skills, tasks};

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state);

    Router::new()
        // ── Tasks ─────────────────────────────────────────────────
        .route("/v1/tasks", post(tasks::create_task).get(tasks::list_tasks))
        .route(
            "/v1/tasks/:id",
            get(tasks::get_task).delete(tasks::cancel_task),
        )
        .route("/v1/tasks/:id/events", get(tasks::task_events_sse))
        .route("/v1/queue/stats", get(tasks::queue_stats))
        // ── HITL ──────────────────────────────────────────────────
        .route("/v1/hitl/respond/:thread_id", post(hitl::respond_to_interrupt))
        .route("/v1/hitl/pending/:thread_id", get(hitl::get_pending_interrupt))
        .route(
            "/v1/hitl/cancel/:thread_id/:interrupt_id",
            delete(hitl::cancel_interrupt),
        )
        // ── Skills ────────────────────────────────────────────────
        .route("/v1/skills", get(skills::list_skills))
        .route("/v1/skills/:id", get(skills::get_skill))
        .route("/v1/skills/executions", get(skills::list_executions))
        // ── Ops ───────────────────────────────────────────────────
        .route("/v1/health", get(health))
        .route("/v1/sandbox/metrics", get(sandbox_metrics))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .server
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "providers": state.llm.provider_ids(),
        "pending_jobs": state.queue.pending_count(),
    }))
}

async fn sandbox_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.sandboxes.metrics().await;
    let totals = metrics.values().fold(
        (0usize, 0u64, 0u64, 0u64, 0u64),
        |acc, m| {
            (
                acc.0 + m.active_sessions,
                acc.1 + m.total_created,
                acc.2 + m.total_reused,
                acc.3 + m.total_cleaned,
                acc.4 + m.health_check_failures,
            )
        },
    );
    Json(json!({
        "managers": metrics,
        "totals": {
            "active_sessions": totals.0,
            "total_created": totals.1,
            "total_reused": totals.2,
            "total_cleaned": totals.3,
            "health_check_failures": totals.4,
        }
    }))
}

/// Sliding-window rate limiting keyed by the trusted client identity.
async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.to_string())
        .unwrap_or_else(|| "unknown".into());

    let client = client_id(&remote, forwarded.as_deref());
    match state.rate_limiter.check(&client) {
        RateDecision::Allowed => next.run(request).await,
        RateDecision::Limited { retry_after_secs } => {
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "rate_limited",
                    "retry_after": retry_after_secs,
                })),
            )
                .into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
            response
        }
    }
}
