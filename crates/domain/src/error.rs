//! Shared error type and the error taxonomy used for retry decisions.
//!
//! Error categories are stable strings — they appear in logs and in task
//! failure records, so renaming a value is a breaking change.

use serde::{Deserialize, Serialize};

/// Shared error type used across all HyperAgent crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("sandbox: {0}")]
    Sandbox(String),

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("guardrail violation: {0}")]
    Guardrail(String),

    #[error("cancelled")]
    Cancelled,

    #[error("iteration budget exceeded ({0} iterations)")]
    BudgetExceeded(u32),

    #[error("circuit breaker open: {0}")]
    CircuitBreakerOpen(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error taxonomy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The recovery-relevant category of a failure.
///
/// - `Transient` — retried with exponential backoff, up to a limit.
/// - `Input` — reported back to the model; the loop continues.
/// - `Permission` — never retried.
/// - `Resource` — never retried; the loop continues.
/// - `Fatal` — aborts the loop.
/// - `Unknown` — treated as fatal after repeated consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Transient,
    Input,
    Permission,
    Resource,
    Fatal,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Input => "input",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Resource => "resource",
            ErrorCategory::Fatal => "fatal",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Whether a tool-level retry makes sense for this category.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorCategory::Transient)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an error message into a recovery category.
///
/// Matching is case-insensitive substring search; the first category with a
/// hit wins, checked from most to least specific. An empty message is
/// `Unknown`.
pub fn classify_error(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    if lower.is_empty() {
        return ErrorCategory::Unknown;
    }

    const FATAL: &[&str] = &["out of memory", "oom", "killed by signal", "circuit breaker open"];
    const PERMISSION: &[&str] = &["permission denied", "403", "forbidden", "401", "unauthorized"];
    const RESOURCE: &[&str] = &[
        "404",
        "not found",
        "no such file",
        "module named",
        "modulenotfound",
    ];
    const TRANSIENT: &[&str] = &[
        "timed out",
        "timeout",
        "connection",
        "429",
        "rate limit",
        "503",
        "service unavailable",
        "temporarily",
    ];
    const INPUT: &[&str] = &[
        "validation",
        "invalid",
        "typeerror",
        "syntaxerror",
        "400",
        "bad request",
        "required",
    ];

    for (patterns, category) in [
        (FATAL, ErrorCategory::Fatal),
        (PERMISSION, ErrorCategory::Permission),
        (RESOURCE, ErrorCategory::Resource),
        (TRANSIENT, ErrorCategory::Transient),
        (INPUT, ErrorCategory::Input),
    ] {
        if patterns.iter().any(|p| lower.contains(p)) {
            return category;
        }
    }

    ErrorCategory::Unknown
}

/// Classify a structured [`Error`] directly, preferring variant knowledge
/// over string matching.
pub fn classify(error: &Error) -> ErrorCategory {
    match error {
        Error::Timeout(_) => ErrorCategory::Transient,
        Error::CircuitBreakerOpen(_) => ErrorCategory::Fatal,
        Error::InvalidParams(_) | Error::Guardrail(_) => ErrorCategory::Input,
        Error::SkillNotFound(_) => ErrorCategory::Resource,
        Error::BudgetExceeded(_) | Error::Cancelled => ErrorCategory::Fatal,
        other => classify_error(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── transient ──────────────────────────────────────────────────

    #[test]
    fn timeout_is_transient() {
        assert_eq!(classify_error("Connection timed out"), ErrorCategory::Transient);
    }

    #[test]
    fn connection_error_is_transient() {
        assert_eq!(
            classify_error("ConnectionError: unable to reach host"),
            ErrorCategory::Transient
        );
    }

    #[test]
    fn rate_limit_is_transient() {
        assert_eq!(
            classify_error("429 Too Many Requests - Rate limit exceeded"),
            ErrorCategory::Transient
        );
    }

    #[test]
    fn service_unavailable_is_transient() {
        assert_eq!(
            classify_error("503 Service Temporarily Unavailable"),
            ErrorCategory::Transient
        );
    }

    // ── input ──────────────────────────────────────────────────────

    #[test]
    fn validation_error_is_input() {
        assert_eq!(
            classify_error("Validation error: field 'url' is required"),
            ErrorCategory::Input
        );
    }

    #[test]
    fn type_error_is_input() {
        assert_eq!(
            classify_error("TypeError: expected string, got int"),
            ErrorCategory::Input
        );
    }

    #[test]
    fn bad_request_is_input() {
        assert_eq!(classify_error("400 Bad Request"), ErrorCategory::Input);
    }

    // ── permission ─────────────────────────────────────────────────

    #[test]
    fn permission_denied_is_permission() {
        assert_eq!(
            classify_error("Permission denied: /etc/shadow"),
            ErrorCategory::Permission
        );
    }

    #[test]
    fn forbidden_is_permission() {
        assert_eq!(classify_error("403 Forbidden"), ErrorCategory::Permission);
        assert_eq!(classify_error("401 Unauthorized"), ErrorCategory::Permission);
    }

    // ── resource ───────────────────────────────────────────────────

    #[test]
    fn not_found_is_resource() {
        assert_eq!(classify_error("404 Not Found"), ErrorCategory::Resource);
    }

    #[test]
    fn no_such_file_is_resource() {
        assert_eq!(
            classify_error("No such file or directory: /tmp/missing.txt"),
            ErrorCategory::Resource
        );
    }

    #[test]
    fn module_missing_is_resource() {
        assert_eq!(
            classify_error("ModuleNotFoundError: No module named 'xyz'"),
            ErrorCategory::Resource
        );
    }

    // ── fatal / unknown ────────────────────────────────────────────

    #[test]
    fn oom_is_fatal() {
        assert_eq!(classify_error("Out of memory"), ErrorCategory::Fatal);
    }

    #[test]
    fn killed_is_fatal() {
        assert_eq!(
            classify_error("Process killed by signal 9"),
            ErrorCategory::Fatal
        );
    }

    #[test]
    fn empty_string_is_unknown() {
        assert_eq!(classify_error(""), ErrorCategory::Unknown);
    }

    #[test]
    fn generic_error_is_unknown() {
        assert_eq!(
            classify_error("Something went wrong"),
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(
            classify_error("CONNECTION TIMED OUT"),
            ErrorCategory::Transient
        );
        assert_eq!(
            classify_error("PERMISSION DENIED"),
            ErrorCategory::Permission
        );
    }

    #[test]
    fn stable_string_values() {
        assert_eq!(ErrorCategory::Transient.as_str(), "transient");
        assert_eq!(ErrorCategory::Input.as_str(), "input");
        assert_eq!(ErrorCategory::Permission.as_str(), "permission");
        assert_eq!(ErrorCategory::Resource.as_str(), "resource");
        assert_eq!(ErrorCategory::Fatal.as_str(), "fatal");
        assert_eq!(ErrorCategory::Unknown.as_str(), "unknown");
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(!ErrorCategory::Input.is_retryable());
        assert!(!ErrorCategory::Fatal.is_retryable());
    }

    #[test]
    fn structured_classification_prefers_variant() {
        assert_eq!(
            classify(&Error::Timeout("model call".into())),
            ErrorCategory::Transient
        );
        assert_eq!(
            classify(&Error::CircuitBreakerOpen("search".into())),
            ErrorCategory::Fatal
        );
        assert_eq!(
            classify(&Error::InvalidParams("missing query".into())),
            ErrorCategory::Input
        );
    }
}
