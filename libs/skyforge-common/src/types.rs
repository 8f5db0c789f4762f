use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum accepted source size in bytes
pub const MAX_SOURCE_BYTES: usize = 50_000;

/// Wall-clock budget for the primary sandbox when the caller gives none
pub const DEFAULT_TIMEOUT_MS: u64 = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Node,
    Javascript,
    Typescript,
    Java,
    C,
    Csharp,
    Go,
    Rust,
    Ruby,
    Php,
    Bash,
}

impl Language {
    pub const ALL: [Language; 12] = [
        Language::Python,
        Language::Node,
        Language::Javascript,
        Language::Typescript,
        Language::Java,
        Language::C,
        Language::Csharp,
        Language::Go,
        Language::Rust,
        Language::Ruby,
        Language::Php,
        Language::Bash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Node => "node",
            Language::Javascript => "javascript",
            Language::Typescript => "typescript",
            Language::Java => "java",
            Language::C => "c",
            Language::Csharp => "csharp",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Bash => "bash",
        }
    }

    /// Look up a wire identifier. Matching is exact: "Python" is not accepted.
    pub fn parse_id(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|lang| lang.as_str() == s)
    }

    /// Comma separated list of every identifier, for error messages
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|lang| lang.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported language '{0}'")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_id(s).ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution backend, in the order the orchestrator tries them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "primary")]
    Primary,
    #[serde(rename = "fallbackA")]
    FallbackA,
    #[serde(rename = "fallbackB")]
    FallbackB,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Primary => "primary",
            Tier::FallbackA => "fallbackA",
            Tier::FallbackB => "fallbackB",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated request. Built only by the request gate (or the CLI).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: Language,
    pub source_code: String,
    pub timeout_ms: u64,
}

impl ExecutionRequest {
    pub fn new(language: Language, source_code: impl Into<String>) -> Self {
        Self {
            language,
            source_code: source_code.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// The single normalized outcome of an execution request.
///
/// `stdout` and `stderr` are trimmed. A non-empty `stderr` alongside
/// `exit_code == 0` is legitimate (compiler warnings, logging) and does not
/// mean failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub duration_ms: u64,
    pub tier_used: Tier,
    /// The primary sandbox killed the program at its deadline
    #[serde(default)]
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Outcome of counting one request against a client's fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub count: u32,
    pub window_reset_at: chrono::DateTime<chrono::Utc>,
}
