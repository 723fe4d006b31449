//! Skill execution engine — interprets declarative skill graphs.

pub mod engine;

pub use engine::{execute_skill, SkillEngine, ToolRunner};
