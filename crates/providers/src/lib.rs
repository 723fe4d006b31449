//! LLM provider abstraction — the trait every model adapter implements,
//! the registry that owns configured providers, the routing classifier,
//! and a scriptable mock for tests.
//!
//! Concrete HTTP adapters for hosted providers are external collaborators;
//! the orchestrator only depends on [`LlmProvider`].

pub mod circuit;
pub mod mock;
pub mod registry;
pub mod router;
pub mod traits;

pub use circuit::CircuitBreaker;
pub use mock::MockProvider;
pub use registry::ProviderRegistry;
pub use router::{
    canonical_agent_name, route_query, AgentType, RoutingDecision, AGENT_NAME_ALIASES,
};
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
