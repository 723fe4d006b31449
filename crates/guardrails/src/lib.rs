//! Guardrails — argument validation and output sanitization for the tool
//! pipeline.
//!
//! Four scanners, all cheap and synchronous:
//! - [`url`] rejects non-http(s) schemes, private/loopback addresses in any
//!   notation, and internal-domain suffixes.
//! - [`command`] refuses destructive shell patterns.
//! - [`input`] flags jailbreak / prompt-injection attempts in user queries.
//! - [`output`] redacts PII-shaped substrings from textual tool results.

pub mod command;
pub mod input;
pub mod output;
pub mod scan;
pub mod truncate;
pub mod url;

pub use command::CommandGuard;
pub use input::InputScanner;
pub use output::OutputScanner;
pub use scan::{ScanResult, Verdict, ViolationType};
pub use truncate::truncate_result;
pub use url::validate_url;
