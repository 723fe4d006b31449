//! Routing classifier — a small model call deciding which agent handles a
//! query, with a keyword fallback when the model is unavailable or slow.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use ha_domain::Message;

use crate::traits::{ChatRequest, LlmProvider};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent vocabulary
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The two canonical agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Task,
    Research,
}

impl AgentType {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentType::Task => "task",
            AgentType::Research => "research",
        }
    }
}

impl std::str::FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match canonical_agent_name(s) {
            Some(AgentType::Task) => Ok(AgentType::Task),
            Some(AgentType::Research) => Ok(AgentType::Research),
            None => Err(format!("unknown agent: {s}")),
        }
    }
}

/// Deprecated agent names and their canonical replacements. Historical
/// clients still send these.
pub const AGENT_NAME_ALIASES: &[(&str, AgentType)] = &[
    ("chat", AgentType::Task),
    ("code", AgentType::Task),
    ("writing", AgentType::Task),
    ("data", AgentType::Task),
    ("image", AgentType::Task),
    ("computer", AgentType::Task),
];

/// Map any historical or canonical agent name to a canonical agent.
pub fn canonical_agent_name(name: &str) -> Option<AgentType> {
    let lower = name.trim().to_lowercase();
    match lower.as_str() {
        "task" => Some(AgentType::Task),
        "research" => Some(AgentType::Research),
        other => AGENT_NAME_ALIASES
            .iter()
            .find(|(alias, _)| *alias == other)
            .map(|(_, canonical)| *canonical),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Routing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The classifier's decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub agent: AgentType,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    agent: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reason: Option<String>,
}

const ROUTER_PROMPT: &str = "You are a routing classifier for an AI assistant. \
Decide which agent should handle the user's query:\n\
- \"task\": conversational requests, Q&A, coding, writing, images, data analysis\n\
- \"research\": deep multi-source research producing a structured report\n\n\
Respond with JSON only: {\"agent\": \"task\"|\"research\", \
\"confidence\": 0.0-1.0, \"reason\": \"<one sentence>\"}";

/// Route a query via the classifier provider, falling back to keywords on
/// timeout, provider error, or malformed output.
pub async fn route_query(
    provider: &dyn LlmProvider,
    model: Option<String>,
    query: &str,
    timeout: Duration,
) -> RoutingDecision {
    let req = ChatRequest {
        messages: vec![Message::system(ROUTER_PROMPT), Message::user(query)],
        tools: vec![],
        temperature: Some(0.0),
        max_tokens: Some(200),
        json_mode: true,
        model,
    };

    let call = provider.chat(&req);
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(response)) => match parse_decision(&response.content) {
            Some(decision) => decision,
            None => {
                tracing::warn!(
                    content = %response.content,
                    "router returned unparseable decision, falling back to keywords"
                );
                keyword_fallback(query)
            }
        },
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "routing classifier failed, falling back to keywords");
            keyword_fallback(query)
        }
        Err(_) => {
            tracing::warn!("routing classifier timed out, falling back to keywords");
            keyword_fallback(query)
        }
    }
}

fn parse_decision(content: &str) -> Option<RoutingDecision> {
    // Models sometimes wrap JSON in a code fence.
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let raw: RawDecision = serde_json::from_str(trimmed).ok()?;
    let agent = canonical_agent_name(&raw.agent)?;
    Some(RoutingDecision {
        agent,
        confidence: raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
        reason: raw.reason.unwrap_or_else(|| "classifier decision".into()),
    })
}

/// Keyword heuristic used when the classifier is unavailable.
pub fn keyword_fallback(query: &str) -> RoutingDecision {
    const RESEARCH_HINTS: &[&str] = &[
        "research",
        "investigate",
        "deep dive",
        "comprehensive",
        "report on",
        "literature",
        "state of the art",
        "compare in depth",
    ];
    let lower = query.to_lowercase();
    let is_research = RESEARCH_HINTS.iter().any(|hint| lower.contains(hint));
    RoutingDecision {
        agent: if is_research {
            AgentType::Research
        } else {
            AgentType::Task
        },
        confidence: 0.3,
        reason: "keyword fallback (classifier unavailable)".into(),
    }
}
