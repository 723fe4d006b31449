//! Declarative skill step graphs.
//!
//! A skill compiles to an ordered list of steps the engine interprets:
//! model calls, tool calls, and pure transforms. Step inputs are JSON
//! templates with `{params.x}` / `{steps.y}` placeholders resolved against
//! the validated input and prior step outputs. Arbitrary user code never
//! enters the picture.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Steps
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkillStep {
    /// One LLM call; the textual reply is stored under `save_as`.
    ModelCall {
        id: String,
        /// Prompt template with placeholders.
        prompt: String,
        #[serde(default)]
        system: Option<String>,
        /// Stream tokens to the event channel while generating.
        #[serde(default)]
        stream: bool,
        save_as: String,
    },
    /// One tool invocation through the regular tool pipeline.
    ToolCall {
        id: String,
        tool: String,
        /// Argument template; string values may carry placeholders.
        args: Value,
        save_as: String,
    },
    /// Assemble a JSON object from templates (no model, no tools).
    Assemble {
        id: String,
        output: Value,
        save_as: String,
    },
}

impl SkillStep {
    pub fn id(&self) -> &str {
        match self {
            SkillStep::ModelCall { id, .. }
            | SkillStep::ToolCall { id, .. }
            | SkillStep::Assemble { id, .. } => id,
        }
    }

    pub fn save_as(&self) -> &str {
        match self {
            SkillStep::ModelCall { save_as, .. }
            | SkillStep::ToolCall { save_as, .. }
            | SkillStep::Assemble { save_as, .. } => save_as,
        }
    }
}

/// The full graph: ordered steps and the template of the final output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillGraph {
    pub steps: Vec<SkillStep>,
    /// Template for the skill's `output` object.
    pub output: Value,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Template rendering
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resolve `{params.<name>}` and `{steps.<id>}` placeholders in a string.
///
/// A string that is exactly one placeholder resolves to the referenced
/// JSON value (preserving its type); otherwise placeholders are spliced in
/// as strings.
pub fn render_string(template: &str, params: &Value, outputs: &Map<String, Value>) -> Value {
    if let Some(value) = lookup_exact(template, params, outputs) {
        return value;
    }

    let mut result = String::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        result.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match lookup(key, params, outputs) {
                    Some(value) => result.push_str(&value_to_string(&value)),
                    None => {
                        result.push('{');
                        result.push_str(key);
                        result.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                result.push('{');
                rest = after;
            }
        }
    }
    result.push_str(rest);
    Value::String(result)
}

/// Render every string in a JSON template.
pub fn render_template(template: &Value, params: &Value, outputs: &Map<String, Value>) -> Value {
    match template {
        Value::String(s) => render_string(s, params, outputs),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| render_template(item, params, outputs))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_template(v, params, outputs)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn lookup_exact(template: &str, params: &Value, outputs: &Map<String, Value>) -> Option<Value> {
    let inner = template.strip_prefix('{')?.strip_suffix('}')?;
    if inner.contains('{') || inner.contains('}') {
        return None;
    }
    lookup(inner, params, outputs)
}

fn lookup(key: &str, params: &Value, outputs: &Map<String, Value>) -> Option<Value> {
    if let Some(name) = key.strip_prefix("params.") {
        return params.get(name).cloned();
    }
    if let Some(path) = key.strip_prefix("steps.") {
        let mut parts = path.splitn(2, '.');
        let step = parts.next()?;
        let value = outputs.get(step)?;
        return match parts.next() {
            Some(field) => value.get(field).cloned(),
            None => Some(value.clone()),
        };
    }
    None
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
