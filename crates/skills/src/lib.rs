//! Skills — declaratively described units of work exposed to agents as
//! single tools.
//!
//! A skill is a [`SkillDefinition`] (typed parameters, output schema, risk
//! level, execution bounds) plus a [`graph::SkillGraph`]: a declarative
//! step list the engine interprets. No user-authored code ever runs inside
//! the orchestrator process; dynamic skills are data, not code.

pub mod builtin;
pub mod graph;
pub mod registry;
pub mod store;
pub mod types;
pub mod validate;

pub use graph::{SkillGraph, SkillStep};
pub use registry::SkillRegistry;
pub use store::ExecutionStore;
pub use types::{
    ExecutionStatus, ParamType, RiskLevel, SkillDefinition, SkillExecution, SkillParam,
};
pub use validate::validate_params;
