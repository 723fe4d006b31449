//! Skill endpoints — list visible skills and query execution records.
//! Execution itself happens through the `invoke_skill` tool inside a task.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(default = "d_user")]
    pub user_id: String,
}

fn d_user() -> String {
    "anonymous".into()
}

#[derive(Debug, Deserialize)]
pub struct ExecutionsQuery {
    #[serde(default = "d_user")]
    pub user_id: String,
    #[serde(default)]
    pub skill_id: Option<String>,
    #[serde(default = "d_limit")]
    pub limit: usize,
}

fn d_limit() -> usize {
    50
}

pub async fn list_skills(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    let skills = state.skill_registry.list_for_user(&query.user_id);
    let count = skills.len();
    Json(json!({ "skills": skills, "count": count }))
}

pub async fn get_skill(
    State(state): State<AppState>,
    Path(skill_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    match state.skill_registry.get_for_user(&skill_id, &query.user_id) {
        Ok(skill) => Json(json!(skill.definition)).into_response(),
        Err(_) => (
            axum::http::StatusCode::NOT_FOUND,
            Json(json!({ "error": "skill not found" })),
        )
            .into_response(),
    }
}

pub async fn list_executions(
    State(state): State<AppState>,
    Query(query): Query<ExecutionsQuery>,
) -> impl IntoResponse {
    let executions = state.skill_store.list_for_user(
        &query.user_id,
        query.skill_id.as_deref(),
        query.limit.min(200),
    );
    let count = executions.len();
    Json(json!({ "executions": executions, "count": count }))
}
