//! Failure taxonomy for the execution tiers.
//!
//! Only two things decide control flow in the orchestrator: whether a tier
//! failure escalates to the next tier, or terminates the request. Timeouts
//! are not errors at all; a killed program still produces output.

use skyforge_common::types::{Language, Tier};
use thiserror::Error;

/// Failure talking to the container runtime
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Daemon absent, socket missing, connection refused
    #[error("container runtime unreachable: {0}")]
    Unreachable(String),
    /// The daemon answered, but the operation failed
    #[error("container operation failed: {0}")]
    Failed(String),
}

impl RuntimeError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, RuntimeError::Unreachable(_))
    }
}

impl From<bollard::errors::Error> for RuntimeError {
    fn from(err: bollard::errors::Error) -> Self {
        use bollard::errors::Error;

        match err {
            Error::SocketNotFoundError(path) => {
                RuntimeError::Unreachable(format!("socket not found: {}", path))
            }
            Error::IOError { err } => RuntimeError::Unreachable(err.to_string()),
            Error::RequestTimeoutError => {
                RuntimeError::Unreachable("request to Docker daemon timed out".to_string())
            }
            Error::DockerResponseServerError {
                status_code,
                message,
            } => RuntimeError::Failed(format!("{} ({})", message, status_code)),
            other => {
                let message = other.to_string();
                if looks_like_connection_failure(&message) {
                    RuntimeError::Unreachable(message)
                } else {
                    RuntimeError::Failed(message)
                }
            }
        }
    }
}

/// Transport errors from the Docker client surface as nested hyper errors
/// whose only stable signal is their text
pub fn looks_like_connection_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    [
        "enoent",
        "no such file or directory",
        "connection refused",
        "error trying to connect",
        "connect",
        "socket",
        "broken pipe",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

/// Failure from a remote execution provider
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{0}")]
    NotConfigured(String),
    #[error("provider rejected the request with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("language '{0}' is not offered by this provider")]
    UnsupportedLanguage(Language),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

/// Outcome of a failed tier attempt
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The primary sandbox runtime cannot be reached
    #[error("sandbox unavailable: {0}")]
    SandboxUnavailable(String),
    #[error("{tier} provider failed: {source}")]
    Provider {
        tier: Tier,
        #[source]
        source: ProviderError,
    },
    /// Anything unanticipated inside a tier. Never retried on another tier.
    #[error("internal execution error: {0}")]
    Internal(String),
}

impl ExecutionError {
    pub fn provider(tier: Tier, source: ProviderError) -> Self {
        ExecutionError::Provider { tier, source }
    }

    /// Whether the orchestrator should move on to the next tier
    pub fn escalates(&self) -> bool {
        matches!(
            self,
            ExecutionError::SandboxUnavailable(_) | ExecutionError::Provider { .. }
        )
    }
}

impl From<RuntimeError> for ExecutionError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Unreachable(msg) => ExecutionError::SandboxUnavailable(msg),
            RuntimeError::Failed(msg) => ExecutionError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failures_are_detected_from_text() {
        assert!(looks_like_connection_failure(
            "error trying to connect: No such file or directory (os error 2)"
        ));
        assert!(looks_like_connection_failure("connect ENOENT /var/run/docker.sock"));
        assert!(!looks_like_connection_failure("No such image: skyforge-go:latest"));
    }

    #[test]
    fn test_bollard_errors_are_classified() {
        let missing = bollard::errors::Error::SocketNotFoundError("/var/run/docker.sock".into());
        assert!(RuntimeError::from(missing).is_unreachable());

        let server = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such image: skyforge-go:latest".into(),
        };
        assert_eq!(
            RuntimeError::from(server),
            RuntimeError::Failed("No such image: skyforge-go:latest (404)".into())
        );
    }

    #[test]
    fn test_runtime_errors_map_to_escalation_policy() {
        let unavailable: ExecutionError = RuntimeError::Unreachable("down".into()).into();
        assert!(unavailable.escalates());

        let internal: ExecutionError = RuntimeError::Failed("bad config".into()).into();
        assert!(!internal.escalates());
    }

    #[test]
    fn test_provider_errors_escalate() {
        let err = ExecutionError::provider(
            Tier::FallbackA,
            ProviderError::Rejected {
                status: 401,
                body: "whitelist only".into(),
            },
        );
        assert!(err.escalates());
        assert!(err.to_string().contains("HTTP 401"));
    }
}
