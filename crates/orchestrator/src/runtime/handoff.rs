//! Agent-to-agent handoff protocol: the permission matrix, loop
//! prevention, and the shared-memory budget carried across hops.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use ha_providers::AgentType;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Matrix
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which agents may delegate to which. Adjacency is static.
pub const HANDOFF_MATRIX: &[(AgentType, &[AgentType])] = &[
    (AgentType::Task, &[AgentType::Research]),
    (AgentType::Research, &[AgentType::Task]),
];

/// Targets the source agent may hand off to.
pub fn allowed_targets(source: AgentType) -> &'static [AgentType] {
    HANDOFF_MATRIX
        .iter()
        .find(|(agent, _)| *agent == source)
        .map(|(_, targets)| *targets)
        .unwrap_or(&[])
}

/// Short capability blurbs used in handoff tool descriptions.
pub fn agent_description(agent: AgentType) -> &'static str {
    match agent {
        AgentType::Task => "general task handling: Q&A, coding, writing, images, data analysis",
        AgentType::Research => "in-depth multi-source research producing a structured report",
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handoff records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffInfo {
    pub source_agent: AgentType,
    pub target_agent: AgentType,
    pub task_description: String,
    pub context: String,
    pub timestamp: DateTime<Utc>,
    /// 1-based position in the handoff chain.
    pub depth: u32,
}

/// Why a requested handoff was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffRejection {
    BudgetExhausted { max: u32 },
    NotPermitted { source: AgentType, target: AgentType },
    PingPong { target: AgentType },
}

impl std::fmt::Display for HandoffRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandoffRejection::BudgetExhausted { max } => {
                write!(f, "handoff budget exhausted ({max} handoffs used)")
            }
            HandoffRejection::NotPermitted { source, target } => write!(
                f,
                "handoff from {} to {} is not permitted",
                source.as_str(),
                target.as_str()
            ),
            HandoffRejection::PingPong { target } => write!(
                f,
                "handoff back to {} rejected (immediate ping-pong)",
                target.as_str()
            ),
        }
    }
}

/// Tracks the handoff chain for one request and prevents loops.
pub struct HandoffManager {
    max_handoffs: u32,
    handoff_count: u32,
    visited_agents: Vec<AgentType>,
    history: Vec<HandoffInfo>,
}

impl HandoffManager {
    pub fn new(starting_agent: AgentType, max_handoffs: u32) -> Self {
        Self {
            max_handoffs,
            handoff_count: 0,
            visited_agents: vec![starting_agent],
            history: Vec::new(),
        }
    }

    pub fn handoff_count(&self) -> u32 {
        self.handoff_count
    }

    pub fn history(&self) -> &[HandoffInfo] {
        &self.history
    }

    /// Validate a requested hop without recording it.
    pub fn can_handoff(
        &self,
        source: AgentType,
        target: AgentType,
    ) -> Result<(), HandoffRejection> {
        if self.handoff_count >= self.max_handoffs {
            return Err(HandoffRejection::BudgetExhausted {
                max: self.max_handoffs,
            });
        }
        if !allowed_targets(source).contains(&target) {
            return Err(HandoffRejection::NotPermitted { source, target });
        }
        // Prevent immediate back-and-forth (A → B → A).
        if self.visited_agents.len() >= 2
            && self.visited_agents[self.visited_agents.len() - 2] == target
        {
            return Err(HandoffRejection::PingPong { target });
        }
        Ok(())
    }

    /// Record a validated hop. Returns the recorded info (with depth).
    pub fn record(
        &mut self,
        source: AgentType,
        target: AgentType,
        task_description: String,
        context: String,
    ) -> HandoffInfo {
        self.handoff_count += 1;
        self.visited_agents.push(target);
        let info = HandoffInfo {
            source_agent: source,
            target_agent: target,
            task_description,
            context,
            timestamp: Utc::now(),
            depth: self.handoff_count,
        };
        self.history.push(info.clone());
        tracing::info!(
            source = source.as_str(),
            target = target.as_str(),
            depth = self.handoff_count,
            "handoff recorded"
        );
        info
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared memory budget
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Total serialized size of the shared memory map (keys + values, UTF-8
/// bytes).
pub fn shared_memory_size(memory: &HashMap<String, String>) -> usize {
    memory.iter().map(|(k, v)| k.len() + v.len()).sum()
}

/// Enforce the shared-memory byte budget in place.
///
/// Keys are ranked by `priorities` (earlier = more important; unlisted
/// keys rank lowest). Lowest-priority entries are truncated to
/// `min_chars` first; if the map is still over budget they are dropped
/// entirely, lowest priority first.
pub fn truncate_shared_memory(
    memory: &mut HashMap<String, String>,
    budget: usize,
    min_chars: usize,
    priorities: &[String],
) {
    if shared_memory_size(memory) <= budget {
        return;
    }

    let rank = |key: &str| -> usize {
        priorities
            .iter()
            .position(|p| p == key)
            .unwrap_or(priorities.len())
    };

    // Lowest priority first (highest rank first).
    let mut keys: Vec<String> = memory.keys().cloned().collect();
    keys.sort_by(|a, b| rank(b).cmp(&rank(a)).then_with(|| b.cmp(a)));

    // Pass 1: truncate values to the floor.
    for key in &keys {
        if shared_memory_size(memory) <= budget {
            return;
        }
        if let Some(value) = memory.get_mut(key) {
            if value.len() > min_chars {
                let mut end = min_chars;
                while end > 0 && !value.is_char_boundary(end) {
                    end -= 1;
                }
                value.truncate(end);
            }
        }
    }

    // Pass 2: drop entries entirely.
    for key in &keys {
        if shared_memory_size(memory) <= budget {
            return;
        }
        memory.remove(key);
        tracing::debug!(key = %key, "shared memory entry dropped for budget");
    }
}

/// Build the query handed to a target agent from the delegation request
/// and the shared memory snapshot.
pub fn build_query_with_context(
    task_description: &str,
    context: &str,
    memory: &HashMap<String, String>,
    priorities: &[String],
) -> String {
    let mut query = String::from(task_description);
    if !context.is_empty() {
        query.push_str("\n\nContext from the delegating agent:\n");
        query.push_str(context);
    }
    if !memory.is_empty() {
        query.push_str("\n\nShared notes:\n");
        // Stable order: priority order first, then the rest alphabetically.
        let mut keys: Vec<&String> = memory.keys().collect();
        let rank = |key: &str| -> usize {
            priorities
                .iter()
                .position(|p| p == key)
                .unwrap_or(priorities.len())
        };
        keys.sort_by(|a, b| rank(a).cmp(&rank(b)).then_with(|| a.cmp(b)));
        for key in keys {
            query.push_str(&format!("- {key}: {}\n", memory[key.as_str()]));
        }
    }
    query
}
