//! Skill data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    /// Whether a JSON value matches this declared type.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillParam {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: String,
    #[serde(default = "d_true")]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

fn d_true() -> bool {
    true
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Definition
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDefinition {
    pub id: String,
    pub name: String,
    #[serde(default = "d_version")]
    pub version: String,
    pub description: String,
    /// "research", "data", "creative", "automation", "code".
    pub category: String,
    pub parameters: Vec<SkillParam>,
    /// JSON schema of the skill's output object.
    pub output_schema: Value,
    #[serde(default)]
    pub required_tools: Vec<String>,
    #[serde(default = "d_risk")]
    pub risk_level: RiskLevel,
    #[serde(default = "d_max_exec")]
    pub max_execution_time_seconds: u64,
    #[serde(default = "d_max_iter")]
    pub max_iterations: u32,
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default)]
    pub is_builtin: bool,
    #[serde(default = "d_author")]
    pub author: String,
}

fn d_version() -> String {
    "1.0.0".into()
}
fn d_risk() -> RiskLevel {
    RiskLevel::Low
}
fn d_max_exec() -> u64 {
    300
}
fn d_max_iter() -> u32 {
    10
}
fn d_author() -> String {
    "hyperagent".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillExecution {
    pub id: Uuid,
    pub skill_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub status: ExecutionStatus,
    pub input_params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl SkillExecution {
    pub fn start(
        skill_id: impl Into<String>,
        user_id: impl Into<String>,
        task_id: Option<String>,
        input_params: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            skill_id: skill_id.into(),
            user_id: user_id.into(),
            task_id,
            status: ExecutionStatus::Running,
            input_params,
            output: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            execution_time_ms: None,
        }
    }

    pub fn finish_success(&mut self, output: Value) {
        self.status = ExecutionStatus::Completed;
        self.output = Some(output);
        self.stamp_end();
    }

    pub fn finish_failure(&mut self, error: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self.stamp_end();
    }

    fn stamp_end(&mut self) {
        let now = Utc::now();
        self.execution_time_ms =
            Some((now - self.started_at).num_milliseconds().max(0) as u64);
        self.completed_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_type_matching() {
        assert!(ParamType::String.matches(&Value::String("x".into())));
        assert!(ParamType::Number.matches(&serde_json::json!(3.5)));
        assert!(ParamType::Number.matches(&serde_json::json!(3)));
        assert!(ParamType::Boolean.matches(&Value::Bool(true)));
        assert!(ParamType::Object.matches(&serde_json::json!({})));
        assert!(ParamType::Array.matches(&serde_json::json!([])));
        assert!(!ParamType::String.matches(&serde_json::json!(1)));
        assert!(!ParamType::Boolean.matches(&serde_json::json!("true")));
    }

    #[test]
    fn execution_lifecycle_success() {
        let mut exec = SkillExecution::start(
            "web_research",
            "u1",
            Some("t1".into()),
            serde_json::json!({"query": "x"}),
        );
        assert_eq!(exec.status, ExecutionStatus::Running);

        exec.finish_success(serde_json::json!({"report": "done"}));
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert!(exec.completed_at.is_some());
        assert!(exec.execution_time_ms.is_some());
        assert!(exec.error.is_none());
    }

    #[test]
    fn execution_lifecycle_failure() {
        let mut exec = SkillExecution::start("x", "u1", None, serde_json::json!({}));
        exec.finish_failure("timed out");
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.error.as_deref(), Some("timed out"));
        assert!(exec.output.is_none());
    }

    #[test]
    fn definition_deserialization_defaults() {
        let def: SkillDefinition = serde_json::from_str(
            r#"{
                "id": "my_skill",
                "name": "My Skill",
                "description": "does things",
                "category": "automation",
                "parameters": [],
                "output_schema": {}
            }"#,
        )
        .unwrap();
        assert_eq!(def.version, "1.0.0");
        assert_eq!(def.risk_level, RiskLevel::Low);
        assert_eq!(def.max_execution_time_seconds, 300);
        assert!(def.enabled);
        assert!(!def.is_builtin);
    }
}
