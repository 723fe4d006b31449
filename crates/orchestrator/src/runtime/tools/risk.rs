//! Tool risk taxonomy for human-in-the-loop gating.
//!
//! HIGH risk tools always require approval, MEDIUM follow the configured
//! threshold, LOW execute directly. Session auto-approvals bypass the gate.

use std::collections::HashSet;

use serde_json::Value;

use ha_domain::config::RiskThreshold;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ToolRisk {
    Low,
    Medium,
    High,
}

/// Tools that always require user approval.
const HIGH_RISK_TOOLS: &[&str] = &[
    // Browser automation reaches arbitrary URLs and performs actions.
    "browser_navigate",
    "browser_click",
    "browser_type",
    "browser_scroll",
    "browser_press_key",
    "browser_screenshot",
    // Arbitrary code execution.
    "execute_code",
    // Sandbox file mutations.
    "sandbox_file",
    // Shell access.
    "shell_command",
];

/// Tools that may require approval depending on the threshold.
const MEDIUM_RISK_TOOLS: &[&str] = &["http_request", "database_write", "file_read"];

pub fn tool_risk(tool_name: &str) -> ToolRisk {
    if HIGH_RISK_TOOLS.contains(&tool_name) {
        ToolRisk::High
    } else if MEDIUM_RISK_TOOLS.contains(&tool_name) {
        ToolRisk::Medium
    } else {
        ToolRisk::Low
    }
}

/// Whether a tool invocation must pause for user approval.
pub fn requires_approval(
    tool_name: &str,
    auto_approve_tools: &HashSet<String>,
    hitl_enabled: bool,
    threshold: RiskThreshold,
) -> bool {
    if !hitl_enabled {
        return false;
    }
    if auto_approve_tools.contains(tool_name) {
        return false;
    }
    match threshold {
        RiskThreshold::High => tool_risk(tool_name) == ToolRisk::High,
        RiskThreshold::Medium => tool_risk(tool_name) >= ToolRisk::Medium,
        RiskThreshold::All => true,
    }
}

/// Human-readable (title, message) for the approval dialog.
pub fn approval_message(tool_name: &str, args: &Value) -> (String, String) {
    match tool_name {
        "browser_navigate" => {
            let url = args.get("url").and_then(|v| v.as_str()).unwrap_or("unknown");
            (
                "Browser Navigation".into(),
                format!(
                    "The agent wants to navigate to:\n\n**{url}**\n\n\
                     This will open a browser and access external content."
                ),
            )
        }
        "browser_click" | "browser_type" => {
            let target = args
                .get("selector")
                .or_else(|| args.get("text"))
                .and_then(|v| v.as_str())
                .unwrap_or("element");
            let action = if tool_name == "browser_click" {
                "click"
            } else {
                "type into"
            };
            (
                "Browser Interaction".into(),
                format!("The agent wants to {action} **{target}** in the browser."),
            )
        }
        "execute_code" => {
            let code = args.get("code").and_then(|v| v.as_str()).unwrap_or("");
            let preview: String = code.chars().take(200).collect();
            let ellipsis = if code.chars().count() > 200 { "..." } else { "" };
            (
                "Code Execution".into(),
                format!(
                    "The agent wants to execute code:\n\n```\n{preview}{ellipsis}\n```\n\n\
                     This code will run in a sandboxed environment."
                ),
            )
        }
        "sandbox_file" => {
            let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("unknown");
            let operation = args
                .get("operation")
                .and_then(|v| v.as_str())
                .unwrap_or("modify");
            (
                "File Operation".into(),
                format!("The agent wants to {operation} the file:\n\n**{path}**"),
            )
        }
        other => (
            format!("Tool Approval: {other}"),
            format!(
                "The agent wants to use the **{other}** tool.\n\nRisk level: **{:?}**",
                tool_risk(other)
            ),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn risk_classification() {
        assert_eq!(tool_risk("execute_code"), ToolRisk::High);
        assert_eq!(tool_risk("browser_navigate"), ToolRisk::High);
        assert_eq!(tool_risk("sandbox_file"), ToolRisk::High);
        assert_eq!(tool_risk("http_request"), ToolRisk::Medium);
        assert_eq!(tool_risk("web_search"), ToolRisk::Low);
        assert_eq!(tool_risk("analyze_image"), ToolRisk::Low);
    }

    #[test]
    fn high_threshold_gates_only_high() {
        let none = HashSet::new();
        assert!(requires_approval("execute_code", &none, true, RiskThreshold::High));
        assert!(!requires_approval("http_request", &none, true, RiskThreshold::High));
        assert!(!requires_approval("web_search", &none, true, RiskThreshold::High));
    }

    #[test]
    fn medium_threshold_gates_medium_and_high() {
        let none = HashSet::new();
        assert!(requires_approval("execute_code", &none, true, RiskThreshold::Medium));
        assert!(requires_approval("http_request", &none, true, RiskThreshold::Medium));
        assert!(!requires_approval("web_search", &none, true, RiskThreshold::Medium));
    }

    #[test]
    fn all_threshold_gates_everything() {
        let none = HashSet::new();
        assert!(requires_approval("web_search", &none, true, RiskThreshold::All));
    }

    #[test]
    fn auto_approved_tools_bypass_gate() {
        let mut approved = HashSet::new();
        approved.insert("execute_code".to_string());
        assert!(!requires_approval(
            "execute_code",
            &approved,
            true,
            RiskThreshold::High
        ));
    }

    #[test]
    fn disabled_hitl_bypasses_gate() {
        let none = HashSet::new();
        assert!(!requires_approval("execute_code", &none, false, RiskThreshold::High));
    }

    #[test]
    fn approval_messages_are_specific() {
        let (title, message) =
            approval_message("execute_code", &json!({"code": "print(1)"}));
        assert_eq!(title, "Code Execution");
        assert!(message.contains("print(1)"));

        let (title, message) =
            approval_message("browser_navigate", &json!({"url": "https://example.com"}));
        assert_eq!(title, "Browser Navigation");
        assert!(message.contains("https://example.com"));

        let (title, _) = approval_message("shell_command", &json!({}));
        assert!(title.contains("shell_command"));
    }

    #[test]
    fn long_code_preview_is_truncated() {
        let code = "x".repeat(500);
        let (_, message) = approval_message("execute_code", &json!({ "code": code }));
        assert!(message.contains("..."));
    }
}
