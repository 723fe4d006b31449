//! Configuration tree, loaded from `config.toml` with serde defaults so a
//! missing file yields a fully usable development configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub react: ReactConfig,
    #[serde(default)]
    pub handoff: HandoffConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub hitl: HitlConfig,
    #[serde(default)]
    pub guardrails: GuardrailsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub research: ResearchConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    /// Origins allowed for CORS. Defaults to localhost-only.
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            host: d_host(),
            allowed_origins: d_cors_origins(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM providers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    /// Provider definitions, keyed by provider id.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Role → "provider/model" mapping (router / executor / summarizer).
    #[serde(default)]
    pub roles: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Adapter kind (e.g. "openai_compat", "anthropic", "mock").
    pub kind: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Default model when a request carries no override.
    #[serde(default)]
    pub model: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ReAct loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactConfig {
    /// Maximum model→tools cycles in one invocation.
    #[serde(default = "d_10")]
    pub max_iterations: u32,
    /// Consecutive tool failures that trip the circuit breaker.
    #[serde(default = "d_3u32")]
    pub consecutive_error_limit: u32,
    /// Per-model-call timeout.
    #[serde(default = "d_120")]
    pub model_timeout_secs: u64,
    /// Retries per tool call for transient errors.
    #[serde(default = "d_3u32")]
    pub tool_max_tries: u32,
    /// Recent messages always kept when trimming to the token budget.
    #[serde(default = "d_preserve_recent")]
    pub preserve_recent: usize,
    /// Approximate token budget for the message list (chars/4 estimate).
    #[serde(default = "d_token_budget")]
    pub token_budget: usize,
    /// Token estimate at which the older history gets summarized.
    #[serde(default = "d_compression_threshold")]
    pub compression_threshold: usize,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            consecutive_error_limit: 3,
            model_timeout_secs: 120,
            tool_max_tries: 3,
            preserve_recent: 10,
            token_budget: 32_000,
            compression_threshold: 60_000,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handoffs & shared memory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    #[serde(default = "d_3u32")]
    pub max_handoffs: u32,
    /// Total serialized byte budget for shared memory across handoffs.
    #[serde(default = "d_shared_memory_budget")]
    pub shared_memory_budget: usize,
    /// Floor a truncated entry shrinks to before being dropped entirely.
    #[serde(default = "d_100")]
    pub shared_memory_min_chars: usize,
    /// Key priority order, highest first. Unlisted keys rank lowest.
    #[serde(default = "d_shared_memory_priorities")]
    pub shared_memory_priorities: Vec<String>,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            max_handoffs: 3,
            shared_memory_budget: 8_192,
            shared_memory_min_chars: 100,
            shared_memory_priorities: d_shared_memory_priorities(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sandbox sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Idle TTL for a sandbox session.
    #[serde(default = "d_600")]
    pub session_ttl_secs: u64,
    /// How often the reaper scans for expired sessions.
    #[serde(default = "d_60")]
    pub reap_interval_secs: u64,
    /// Global cap per manager; LRU sessions are evicted past this.
    #[serde(default = "d_20")]
    pub max_sessions: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 600,
            reap_interval_secs: 60,
            max_sessions: 20,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task queue & worker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Task-level retries for transient failures.
    #[serde(default = "d_3u32")]
    pub max_retries: u32,
    /// Worker poll period.
    #[serde(default = "d_500")]
    pub poll_delay_ms: u64,
    /// Concurrent jobs per worker.
    #[serde(default = "d_4")]
    pub max_jobs: usize,
    /// Base delay for job re-enqueue backoff.
    #[serde(default = "d_5")]
    pub backoff_base_secs: u64,
    /// Grace period to drain running jobs on shutdown.
    #[serde(default = "d_30")]
    pub shutdown_grace_secs: u64,
    /// Directory for the durable task JSONL log.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            poll_delay_ms: 500,
            max_jobs: 4,
            backoff_base_secs: 5,
            shutdown_grace_secs: 30,
            state_path: d_state_path(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Human-in-the-loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskThreshold {
    /// Only HIGH risk tools require approval.
    High,
    /// HIGH and MEDIUM risk tools require approval.
    Medium,
    /// Every tool requires approval.
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_risk_threshold")]
    pub risk_threshold: RiskThreshold,
    /// How long an interrupt waits for a user decision.
    #[serde(default = "d_300")]
    pub decision_timeout_secs: u64,
}

impl Default for HitlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            risk_threshold: RiskThreshold::High,
            decision_timeout_secs: 300,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Guardrails
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationAction {
    Block,
    Warn,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailsConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_true")]
    pub input_enabled: bool,
    #[serde(default = "d_true")]
    pub output_enabled: bool,
    #[serde(default = "d_violation_action")]
    pub violation_action: ViolationAction,
    /// Hostname suffixes the URL validator refuses outright.
    #[serde(default = "d_blocked_domains")]
    pub blocked_domains: Vec<String>,
    /// Byte budget for a single tool result before truncation.
    #[serde(default = "d_result_max_bytes")]
    pub result_max_bytes: usize,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            input_enabled: true,
            output_enabled: true,
            violation_action: ViolationAction::Block,
            blocked_domains: d_blocked_domains(),
            result_max_bytes: 16_384,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rate limiting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Requests per minute per client identifier.
    #[serde(default = "d_60u32")]
    pub rpm: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rpm: 60,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Research pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Whole-task timeout for research runs.
    #[serde(default = "d_1800")]
    pub task_timeout_secs: u64,
    /// Timeout for the routing classifier call.
    #[serde(default = "d_30")]
    pub routing_timeout_secs: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            task_timeout_secs: 1_800,
            routing_timeout_secs: 30,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Skills
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    /// Directory for the skill execution JSONL log.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
    /// Default per-skill timeout when a definition carries none.
    #[serde(default = "d_120")]
    pub default_timeout_secs: u64,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            default_timeout_secs: 120,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-tool timeouts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "d_30")]
    pub http_timeout_secs: u64,
    #[serde(default = "d_180")]
    pub code_timeout_secs: u64,
    #[serde(default = "d_120")]
    pub shell_timeout_secs: u64,
    #[serde(default = "d_60")]
    pub search_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: 30,
            code_timeout_secs: 180,
            shell_timeout_secs: 120,
            search_timeout_secs: 60,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Config {
    /// Sanity-check the configuration. Errors prevent startup; warnings are
    /// logged and ignored.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.react.max_iterations == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "react.max_iterations is 0 — every loop terminates immediately".into(),
            });
        }

        let mut err = |message: String| {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message,
            })
        };

        if self.react.preserve_recent == 0 {
            err("react.preserve_recent must be at least 1".into());
        }
        if self.react.token_budget == 0 {
            err("react.token_budget must be non-zero".into());
        }
        if self.handoff.shared_memory_budget == 0 {
            err("handoff.shared_memory_budget must be non-zero".into());
        }
        if self.queue.max_jobs == 0 {
            err("queue.max_jobs must be at least 1".into());
        }
        if self.rate_limit.enabled && self.rate_limit.rpm == 0 {
            err("rate_limit.rpm must be non-zero when rate limiting is enabled".into());
        }
        for (id, provider) in &self.llm.providers {
            if provider.kind.is_empty() {
                err(format!("llm.providers.{id}.kind must not be empty"));
            }
        }

        issues
    }
}

// ── serde default helpers ──────────────────────────────────────────

fn d_port() -> u16 {
    8030
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".into(), "http://127.0.0.1:3000".into()]
}
fn d_3u32() -> u32 {
    3
}
fn d_10() -> u32 {
    10
}
fn d_4() -> usize {
    4
}
fn d_5() -> u64 {
    5
}
fn d_20() -> usize {
    20
}
fn d_30() -> u64 {
    30
}
fn d_60() -> u64 {
    60
}
fn d_60u32() -> u32 {
    60
}
fn d_100() -> usize {
    100
}
fn d_120() -> u64 {
    120
}
fn d_180() -> u64 {
    180
}
fn d_300() -> u64 {
    300
}
fn d_500() -> u64 {
    500
}
fn d_600() -> u64 {
    600
}
fn d_1800() -> u64 {
    1_800
}
fn d_true() -> bool {
    true
}
fn d_preserve_recent() -> usize {
    10
}
fn d_token_budget() -> usize {
    32_000
}
fn d_compression_threshold() -> usize {
    60_000
}
fn d_shared_memory_budget() -> usize {
    8_192
}
fn d_shared_memory_priorities() -> Vec<String> {
    vec!["facts".into(), "plan".into(), "notes".into()]
}
fn d_result_max_bytes() -> usize {
    16_384
}
fn d_risk_threshold() -> RiskThreshold {
    RiskThreshold::High
}
fn d_violation_action() -> ViolationAction {
    ViolationAction::Block
}
fn d_blocked_domains() -> Vec<String> {
    vec![
        "localhost".into(),
        "metadata.google.internal".into(),
        ".internal".into(),
        ".local".into(),
    ]
}
fn d_state_path() -> PathBuf {
    PathBuf::from("./data/state")
}
