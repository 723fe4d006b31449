//! Per-invocation agent state, owned exclusively by the ReAct driver.

use std::collections::{HashMap, HashSet};

use ha_domain::Message;
use ha_providers::AgentType;

use super::handoff::HandoffInfo;

/// Everything one agent invocation carries between loop iterations and
/// across handoffs. Purely in-process.
pub struct AgentState {
    // ── Input ─────────────────────────────────────────────────────
    pub query: String,
    pub user_id: String,
    pub task_id: String,
    /// Thread key used for interrupts (reconnection rehydration).
    pub thread_id: String,
    pub attachment_ids: Vec<String>,
    pub locale: String,

    // ── Routing ───────────────────────────────────────────────────
    pub selected_agent: AgentType,
    pub routing_reason: String,
    pub routing_confidence: f64,
    pub active_agent: AgentType,

    // ── Handoffs ──────────────────────────────────────────────────
    pub handoff_count: u32,
    pub handoff_history: Vec<HandoffInfo>,
    pub shared_memory: HashMap<String, String>,

    // ── Loop tracking ─────────────────────────────────────────────
    pub tool_iterations: u32,
    pub consecutive_errors: u32,
    pub messages: Vec<Message>,
    pub context_summary: Option<String>,

    // ── HITL ──────────────────────────────────────────────────────
    pub auto_approve_tools: HashSet<String>,
    pub hitl_enabled: bool,

    // ── Model selection ───────────────────────────────────────────
    pub model: Option<String>,
}

impl AgentState {
    pub fn new(
        query: impl Into<String>,
        user_id: impl Into<String>,
        task_id: impl Into<String>,
        agent: AgentType,
    ) -> Self {
        let task_id = task_id.into();
        Self {
            query: query.into(),
            user_id: user_id.into(),
            thread_id: task_id.clone(),
            task_id,
            attachment_ids: Vec::new(),
            locale: "en".into(),
            selected_agent: agent,
            routing_reason: String::new(),
            routing_confidence: 0.0,
            active_agent: agent,
            handoff_count: 0,
            handoff_history: Vec::new(),
            shared_memory: HashMap::new(),
            tool_iterations: 0,
            consecutive_errors: 0,
            messages: Vec::new(),
            context_summary: None,
            auto_approve_tools: HashSet::new(),
            hitl_enabled: true,
            model: None,
        }
    }

    /// Reset the per-invocation loop counters when a new agent takes over.
    /// Handoff history and shared memory survive; iteration and error
    /// counters do not.
    pub fn enter_agent(&mut self, agent: AgentType, query: String) {
        self.active_agent = agent;
        self.query = query;
        self.tool_iterations = 0;
        self.consecutive_errors = 0;
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let state = AgentState::new("q", "u1", "t1", AgentType::Task);
        assert_eq!(state.thread_id, "t1");
        assert_eq!(state.tool_iterations, 0);
        assert!(state.hitl_enabled);
        assert!(state.auto_approve_tools.is_empty());
    }

    #[test]
    fn enter_agent_resets_loop_counters_only() {
        let mut state = AgentState::new("q", "u1", "t1", AgentType::Task);
        state.tool_iterations = 5;
        state.consecutive_errors = 2;
        state.messages.push(Message::user("old"));
        state
            .shared_memory
            .insert("facts".into(), "carried".into());
        state.handoff_count = 1;

        state.enter_agent(AgentType::Research, "new query".into());

        assert_eq!(state.active_agent, AgentType::Research);
        assert_eq!(state.query, "new query");
        assert_eq!(state.tool_iterations, 0);
        assert_eq!(state.consecutive_errors, 0);
        assert!(state.messages.is_empty());
        // Cross-handoff state survives.
        assert_eq!(state.shared_memory["facts"], "carried");
        assert_eq!(state.handoff_count, 1);
    }
}
