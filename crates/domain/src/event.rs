//! The streamed event model — every progress record a worker publishes on
//! a task channel is one of these, serialized as a JSON object with a
//! top-level `type` discriminator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stage / interrupt vocabulary
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lifecycle status of a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Running,
    Completed,
    Failed,
}

/// What kind of user interaction an interrupt is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptKind {
    /// Yes/no gate before a risky tool runs.
    Approval,
    /// Multiple-choice question.
    Decision,
    /// Free-form text input.
    Input,
}

/// One selectable option in a decision interrupt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterruptOption {
    pub label: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A progress event emitted while a task runs.
///
/// The wire encoding is one JSON object per event with a `type` string so
/// existing SSE clients keep working unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Emitted once when the worker picks the task up.
    TaskStarted { task_id: String },

    /// A streaming model output fragment.
    Token { content: String },

    /// Several tokens coalesced by the publisher to cap publish volume.
    TokenBatch { content: String },

    /// A pipeline lifecycle milestone (search / analyze / write / skill_*).
    Stage {
        name: String,
        description: String,
        status: StageStatus,
    },

    /// The model is invoking a tool.
    ToolCall {
        tool: String,
        args: Value,
        id: String,
    },

    /// A tool finished (or failed).
    ToolResult {
        tool: String,
        output: String,
        id: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },

    /// A research finding.
    Source {
        title: String,
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        snippet: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        relevance_score: Option<f64>,
    },

    /// A generated image, inline or by reference.
    Image {
        #[serde(skip_serializing_if = "Option::is_none")]
        data_base64: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        mime_type: String,
        index: u32,
    },

    /// Agent-to-agent delegation.
    Handoff {
        source: String,
        target: String,
        task: String,
    },

    /// Live desktop-sandbox feed became available.
    BrowserStream {
        stream_url: String,
        sandbox_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        auth_key: Option<String>,
    },

    /// Optional transparency event carrying model reasoning.
    Reasoning {
        thinking: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },

    /// The loop is suspended waiting for a user decision.
    Interrupt {
        interrupt_id: String,
        title: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        options: Option<Vec<InterruptOption>>,
        kind: InterruptKind,
    },

    /// Coarse completion percentage.
    Progress {
        percentage: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Final output of a skill sub-graph.
    SkillOutput { skill_id: String, output: Value },

    /// Terminal success. Last event on a channel.
    Complete {},

    /// An error occurred. Terminal when it carries `name = "cancelled"` or
    /// follows a fatal failure.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl Event {
    /// Whether this event ends the stream for its channel.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Complete {} | Event::Error { .. })
    }

    /// The `type` discriminator as it appears on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::TaskStarted { .. } => "task_started",
            Event::Token { .. } => "token",
            Event::TokenBatch { .. } => "token_batch",
            Event::Stage { .. } => "stage",
            Event::ToolCall { .. } => "tool_call",
            Event::ToolResult { .. } => "tool_result",
            Event::Source { .. } => "source",
            Event::Image { .. } => "image",
            Event::Handoff { .. } => "handoff",
            Event::BrowserStream { .. } => "browser_stream",
            Event::Reasoning { .. } => "reasoning",
            Event::Interrupt { .. } => "interrupt",
            Event::Progress { .. } => "progress",
            Event::SkillOutput { .. } => "skill_output",
            Event::Complete {} => "complete",
            Event::Error { .. } => "error",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The published form of an [`Event`]: the event plus the task id, a
/// per-task monotonically increasing ordinal, and a wall-clock timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(flatten)]
    pub event: Event,
    pub task_id: String,
    /// Local ordinal, strictly increasing per publisher.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
}
