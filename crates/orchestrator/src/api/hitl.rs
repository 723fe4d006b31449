//! Human-in-the-loop endpoints.
//!
//! - `POST   /v1/hitl/respond/:thread_id`             — deliver a decision
//! - `GET    /v1/hitl/pending/:thread_id`             — reconnection recovery
//! - `DELETE /v1/hitl/cancel/:thread_id/:interrupt_id` — cancel an interrupt

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::runtime::interrupt::InterruptAction;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InterruptResponseRequest {
    pub interrupt_id: String,
    pub action: InterruptAction,
    #[serde(default)]
    pub value: Option<String>,
}

pub async fn respond_to_interrupt(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Json(body): Json<InterruptResponseRequest>,
) -> impl IntoResponse {
    let delivered = state.interrupts.submit_response(
        &thread_id,
        &body.interrupt_id,
        body.action,
        body.value,
    );

    if delivered {
        tracing::info!(
            thread_id = %thread_id,
            interrupt_id = %body.interrupt_id,
            action = ?body.action,
            "interrupt response submitted"
        );
        Json(json!({
            "success": true,
            "message": "response submitted",
        }))
        .into_response()
    } else {
        (
            axum::http::StatusCode::GONE,
            Json(json!({
                "success": false,
                "message": "No active listener for this interrupt. It may have timed out.",
            })),
        )
            .into_response()
    }
}

pub async fn get_pending_interrupt(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> impl IntoResponse {
    match state.interrupts.get_pending_interrupt(&thread_id) {
        Some(interrupt) => Json(json!({
            "has_pending": true,
            "interrupt": interrupt,
        })),
        None => Json(json!({
            "has_pending": false,
            "interrupt": null,
        })),
    }
}

pub async fn cancel_interrupt(
    State(state): State<AppState>,
    Path((thread_id, interrupt_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let cancelled = state.interrupts.cancel_interrupt(&thread_id, &interrupt_id);
    if cancelled {
        Json(json!({ "success": true, "message": "interrupt cancelled" })).into_response()
    } else {
        (
            axum::http::StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "message": "interrupt not found or already processed",
            })),
        )
            .into_response()
    }
}
