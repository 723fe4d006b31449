//! Sandbox session management — keyed pools of external execution
//! environments with TTL, health checks, and background reaping.
//!
//! Concrete sandbox providers (cloud or local containers) live outside this
//! crate; they implement [`SandboxRuntime`] and hand back [`Sandbox`]
//! handles. One [`SandboxManager`] exists per sandbox kind (execution /
//! desktop / app), each serialising access to its own session map.

pub mod manager;
pub mod runtime;

pub use manager::{SandboxManager, SandboxManagerSet, SandboxMetrics, SessionInfo};
pub use runtime::{
    BrowserAction, ExecOutput, ExecRequest, FileOperation, FileOpResult, Sandbox, SandboxExecutor,
    SandboxKind, SandboxRuntime, StreamInfo,
};
