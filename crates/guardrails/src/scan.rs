//! Common scan result vocabulary shared by all scanners.

use serde::{Deserialize, Serialize};

/// What kind of policy a scanner tripped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    PromptInjection,
    Jailbreak,
    InvalidUrl,
    UnsafeCode,
    Pii,
    HarmfulContent,
}

/// The scanner's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Content passes unchanged.
    Allow,
    /// Content passes but the violation is recorded.
    Flag,
    /// Content must not proceed.
    Block,
}

/// Outcome of one scan: a verdict, the violations found, and optionally a
/// sanitized replacement for the content.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub verdict: Verdict,
    pub violations: Vec<ViolationType>,
    pub reason: Option<String>,
    /// Present when the scanner rewrote the content (e.g. PII redaction).
    pub sanitized: Option<String>,
}

impl ScanResult {
    pub fn allow() -> Self {
        Self {
            verdict: Verdict::Allow,
            violations: Vec::new(),
            reason: None,
            sanitized: None,
        }
    }

    pub fn flag(violations: Vec<ViolationType>, reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Flag,
            violations,
            reason: Some(reason.into()),
            sanitized: None,
        }
    }

    pub fn block(violations: Vec<ViolationType>, reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Block,
            violations,
            reason: Some(reason.into()),
            sanitized: None,
        }
    }

    pub fn redacted(sanitized: String, violations: Vec<ViolationType>) -> Self {
        Self {
            verdict: Verdict::Allow,
            violations,
            reason: Some("sensitive data redacted".into()),
            sanitized: Some(sanitized),
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict != Verdict::Block
    }
}
