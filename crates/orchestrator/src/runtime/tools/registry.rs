//! Tool registry — the categorised catalogue and the descriptors exposed
//! to the model.
//!
//! Agents request categories; the registry returns de-duplicated
//! descriptors. Handoff tools are generated per source agent from the
//! handoff matrix.

use serde_json::json;

use ha_domain::ToolDescriptor;
use ha_providers::AgentType;

use crate::runtime::handoff::{agent_description, allowed_targets};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Categories
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolCategory {
    Search,
    Image,
    Browser,
    CodeExecution,
    DataFile,
    Handoff,
    Skill,
    Hitl,
}

/// Categories available to each agent.
pub fn agent_categories(agent: AgentType) -> &'static [ToolCategory] {
    match agent {
        AgentType::Task => &[
            ToolCategory::Search,
            ToolCategory::Image,
            ToolCategory::Browser,
            ToolCategory::CodeExecution,
            ToolCategory::DataFile,
            ToolCategory::Skill,
            ToolCategory::Hitl,
            ToolCategory::Handoff,
        ],
        AgentType::Research => &[
            ToolCategory::Search,
            ToolCategory::DataFile,
            ToolCategory::Handoff,
        ],
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Descriptors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Descriptors for one category. Fields marked injected in the contract
/// (user_id, task_id) never appear in the schema shown to the model.
pub fn category_tools(category: ToolCategory) -> Vec<ToolDescriptor> {
    match category {
        ToolCategory::Search => vec![ToolDescriptor {
            name: "web_search".into(),
            description: "Search the web. Returns ranked results with titles, URLs and snippets."
                .into(),
            args_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" },
                    "max_results": { "type": "integer", "minimum": 1, "maximum": 20 },
                    "search_depth": { "type": "string", "enum": ["basic", "advanced"] }
                },
                "required": ["query"]
            }),
        }],
        ToolCategory::Image => vec![
            ToolDescriptor {
                name: "generate_image".into(),
                description: "Generate images from a text prompt.".into(),
                args_schema: json!({
                    "type": "object",
                    "properties": {
                        "prompt": { "type": "string" },
                        "size": { "type": "string", "enum": ["512x512", "1024x1024", "1792x1024"] },
                        "n": { "type": "integer", "minimum": 1, "maximum": 4 },
                        "model": { "type": "string" },
                        "quality": { "type": "string", "enum": ["standard", "hd"] }
                    },
                    "required": ["prompt"]
                }),
            },
            ToolDescriptor {
                name: "analyze_image".into(),
                description: "Describe the contents of an attached image.".into(),
                args_schema: json!({
                    "type": "object",
                    "properties": {
                        "attachment_id": { "type": "string" },
                        "question": { "type": "string" }
                    },
                    "required": ["attachment_id"]
                }),
            },
        ],
        ToolCategory::Browser => vec![
            ToolDescriptor {
                name: "browser_navigate".into(),
                description: "Open a URL in the desktop sandbox browser.".into(),
                args_schema: json!({
                    "type": "object",
                    "properties": { "url": { "type": "string" } },
                    "required": ["url"]
                }),
            },
            ToolDescriptor {
                name: "browser_click".into(),
                description: "Click at coordinates in the sandbox browser.".into(),
                args_schema: json!({
                    "type": "object",
                    "properties": {
                        "x": { "type": "integer" },
                        "y": { "type": "integer" }
                    },
                    "required": ["x", "y"]
                }),
            },
            ToolDescriptor {
                name: "browser_type".into(),
                description: "Type text into the focused element.".into(),
                args_schema: json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"]
                }),
            },
            ToolDescriptor {
                name: "browser_press_key".into(),
                description: "Press a keyboard key (e.g. Enter, Tab) in the sandbox browser."
                    .into(),
                args_schema: json!({
                    "type": "object",
                    "properties": { "key": { "type": "string" } },
                    "required": ["key"]
                }),
            },
            ToolDescriptor {
                name: "browser_scroll".into(),
                description: "Scroll the page by pixel deltas.".into(),
                args_schema: json!({
                    "type": "object",
                    "properties": {
                        "dx": { "type": "integer" },
                        "dy": { "type": "integer" }
                    }
                }),
            },
            ToolDescriptor {
                name: "browser_screenshot".into(),
                description: "Capture a screenshot of the sandbox desktop.".into(),
                args_schema: json!({ "type": "object", "properties": {} }),
            },
        ],
        ToolCategory::CodeExecution => vec![ToolDescriptor {
            name: "execute_code".into(),
            description: "Execute code in an isolated sandbox and return stdout/stderr.".into(),
            args_schema: json!({
                "type": "object",
                "properties": {
                    "code": { "type": "string" },
                    "language": {
                        "type": "string",
                        "enum": ["python", "javascript", "typescript", "bash"]
                    },
                    "packages": { "type": "array", "items": { "type": "string" } },
                    "capture_visualizations": { "type": "boolean" },
                    "timeout": { "type": "integer", "minimum": 1, "maximum": 600 }
                },
                "required": ["code", "language"]
            }),
        }],
        ToolCategory::DataFile => vec![
            ToolDescriptor {
                name: "sandbox_file".into(),
                description: "Read, write, list, delete or stat files in the task sandbox."
                    .into(),
                args_schema: json!({
                    "type": "object",
                    "properties": {
                        "operation": {
                            "type": "string",
                            "enum": ["read", "write", "list", "delete", "exists"]
                        },
                        "path": { "type": "string" },
                        "content": { "type": "string" },
                        "is_binary": { "type": "boolean" }
                    },
                    "required": ["operation", "path"]
                }),
            },
            ToolDescriptor {
                name: "http_request".into(),
                description: "Make an HTTP request to a public URL.".into(),
                args_schema: json!({
                    "type": "object",
                    "properties": {
                        "url": { "type": "string" },
                        "method": {
                            "type": "string",
                            "enum": ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"]
                        },
                        "headers": { "type": "object" },
                        "body": { "type": "string" },
                        "timeout": { "type": "integer", "minimum": 1, "maximum": 120 }
                    },
                    "required": ["url", "method"]
                }),
            },
        ],
        ToolCategory::Skill => vec![ToolDescriptor {
            name: "invoke_skill".into(),
            description: "Run a registered skill by id with JSON parameters.".into(),
            args_schema: json!({
                "type": "object",
                "properties": {
                    "skill_id": { "type": "string" },
                    "params": { "type": "object" }
                },
                "required": ["skill_id", "params"]
            }),
        }],
        ToolCategory::Hitl => vec![ToolDescriptor {
            name: "ask_user".into(),
            description: "Ask the user a question and wait for their response. Use when you \
                          need a decision, free-form input, or confirmation to proceed."
                .into(),
            args_schema: json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string" },
                    "question_type": {
                        "type": "string",
                        "enum": ["decision", "input", "confirmation"]
                    },
                    "options": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "label": { "type": "string" },
                                "value": { "type": "string" },
                                "description": { "type": "string" }
                            },
                            "required": ["label", "value"]
                        }
                    },
                    "context": { "type": "string" }
                },
                "required": ["question"]
            }),
        }],
        ToolCategory::Handoff => vec![], // generated per source agent below
    }
}

/// The `handoff_to_<agent>` descriptors for a source agent.
pub fn handoff_tools_for(source: AgentType) -> Vec<ToolDescriptor> {
    allowed_targets(source)
        .iter()
        .map(|target| ToolDescriptor {
            name: format!("handoff_to_{}", target.as_str()),
            description: format!(
                "Transfer this task to the {} agent for {}.",
                target.as_str(),
                agent_description(*target)
            ),
            args_schema: json!({
                "type": "object",
                "properties": {
                    "task_description": {
                        "type": "string",
                        "description": "What the target agent should accomplish"
                    },
                    "context": {
                        "type": "string",
                        "description": "Additional context for the target agent"
                    }
                },
                "required": ["task_description"]
            }),
        })
        .collect()
}

/// Full de-duplicated tool set for an agent.
pub fn tools_for_agent(agent: AgentType) -> Vec<ToolDescriptor> {
    let mut descriptors: Vec<ToolDescriptor> = Vec::new();
    for category in agent_categories(agent) {
        for descriptor in category_tools(*category) {
            if !descriptors.iter().any(|d| d.name == descriptor.name) {
                descriptors.push(descriptor);
            }
        }
    }
    for descriptor in handoff_tools_for(agent) {
        if !descriptors.iter().any(|d| d.name == descriptor.name) {
            descriptors.push(descriptor);
        }
    }
    descriptors
}

/// Whether a tool name is a handoff marker tool.
pub fn is_handoff_tool(name: &str) -> bool {
    name.starts_with("handoff_to_")
}
