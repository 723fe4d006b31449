//! Output scanner — redacts PII-shaped substrings from textual tool results
//! and final responses before they are streamed to clients.

use regex::Regex;

use ha_domain::config::GuardrailsConfig;

use crate::scan::{ScanResult, ViolationType};

pub struct OutputScanner {
    enabled: bool,
    patterns: Vec<(Regex, &'static str)>,
}

impl OutputScanner {
    pub fn new(config: &GuardrailsConfig) -> Self {
        // Patterns are static and known-valid.
        let compile = |p: &str| Regex::new(p).ok();
        let mut patterns = Vec::new();
        let specs: &[(&str, &'static str)] = &[
            // email
            (
                r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
                "[REDACTED_EMAIL]",
            ),
            // 13–16 digit card-like runs, optionally spaced/dashed in 4s
            (
                r"\b(?:\d[ -]?){13,16}\b",
                "[REDACTED_NUMBER]",
            ),
            // API-key-shaped: long token with a key-ish prefix
            (
                r"\b(?:sk|pk|api|key|token)[-_][A-Za-z0-9_\-]{16,}\b",
                "[REDACTED_KEY]",
            ),
            // US-style SSN
            (r"\b\d{3}-\d{2}-\d{4}\b", "[REDACTED_SSN]"),
        ];
        for (pattern, replacement) in specs {
            if let Some(re) = compile(pattern) {
                patterns.push((re, *replacement));
            }
        }
        Self {
            enabled: config.enabled && config.output_enabled,
            patterns,
        }
    }

    /// Scan and, when needed, redact output text.
    pub fn scan(&self, content: &str) -> ScanResult {
        if !self.enabled || content.is_empty() {
            return ScanResult::allow();
        }

        let mut sanitized = content.to_string();
        let mut hit = false;
        for (re, replacement) in &self.patterns {
            if re.is_match(&sanitized) {
                hit = true;
                sanitized = re.replace_all(&sanitized, *replacement).into_owned();
            }
        }

        if hit {
            tracing::info!("pii redacted from tool output");
            ScanResult::redacted(sanitized, vec![ViolationType::Pii])
        } else {
            ScanResult::allow()
        }
    }

    /// Convenience: return the content with redactions applied (or
    /// unchanged when clean).
    pub fn sanitize(&self, content: &str) -> String {
        match self.scan(content).sanitized {
            Some(s) => s,
            None => content.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> OutputScanner {
        OutputScanner::new(&GuardrailsConfig::default())
    }

    #[test]
    fn clean_text_untouched() {
        let s = scanner();
        let text = "The battery was invented in 1991.";
        assert_eq!(s.sanitize(text), text);
    }

    #[test]
    fn email_redacted() {
        let s = scanner();
        let out = s.sanitize("contact alice@example.com for details");
        assert!(!out.contains("alice@example.com"));
        assert!(out.contains("[REDACTED_EMAIL]"));
    }

    #[test]
    fn card_number_redacted() {
        let s = scanner();
        let out = s.sanitize("card: 4111 1111 1111 1111 ok");
        assert!(out.contains("[REDACTED_NUMBER]"));
    }

    #[test]
    fn api_key_redacted() {
        let s = scanner();
        let out = s.sanitize("use key sk-abcdefghijklmnop1234 in the header");
        assert!(out.contains("[REDACTED_KEY]"));
    }

    #[test]
    fn ssn_redacted() {
        let s = scanner();
        let out = s.sanitize("ssn is 123-45-6789.");
        assert!(out.contains("[REDACTED_SSN]"));
    }

    #[test]
    fn disabled_scanner_passes_through() {
        let s = OutputScanner::new(&GuardrailsConfig {
            output_enabled: false,
            ..Default::default()
        });
        let text = "mail me at bob@example.com";
        assert_eq!(s.sanitize(text), text);
    }

    #[test]
    fn scan_reports_pii_violation() {
        let s = scanner();
        let result = s.scan("reach me: carol@example.org");
        assert!(result.passed());
        assert_eq!(result.violations, vec![ViolationType::Pii]);
        assert!(result.sanitized.is_some());
    }
}
