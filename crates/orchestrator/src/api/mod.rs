//! HTTP surface: task submission and streaming, HITL responses, skill
//! listings, and operational endpoints.

pub mod hitl;
pub mod rate_limit;
pub mod router;
pub mod skills;
pub mod tasks;

pub use router::build_router;
