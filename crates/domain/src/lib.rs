//! Shared domain types for the HyperAgent orchestration backend.
//!
//! Everything that crosses a crate boundary lives here: the streamed event
//! model, provider-agnostic messages and tool calls, the error taxonomy,
//! and the configuration tree.

pub mod backoff;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod stream;

pub use error::{classify, classify_error, Error, ErrorCategory, Result};
pub use event::{Event, EventEnvelope, InterruptKind, StageStatus};
pub use message::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDescriptor};
pub use stream::{BoxStream, StreamEvent, Usage};
