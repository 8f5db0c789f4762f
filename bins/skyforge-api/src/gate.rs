/// Request Gate - admission control in front of the orchestrator
///
/// Every run request is counted against the client's rate-limit window
/// first, then validated. Only a request that passes both reaches execution.

use axum::http::HeaderMap;
use chrono::Utc;
use serde_json::Value;
use skyforge_common::types::{ExecutionRequest, Language, MAX_SOURCE_BYTES};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::rate_limit::RateLimitStore;

pub struct RequestGate {
    limiter: Arc<dyn RateLimitStore>,
    max_requests: u32,
    window_ms: u64,
    timeout_ms: u64,
}

impl RequestGate {
    pub fn new(
        limiter: Arc<dyn RateLimitStore>,
        max_requests: u32,
        window_ms: u64,
        timeout_ms: u64,
    ) -> Self {
        Self {
            limiter,
            max_requests,
            window_ms,
            timeout_ms,
        }
    }

    /// Rate-limit then validate one run request
    pub async fn accept(
        &self,
        client_key: &str,
        language: Option<&str>,
        code: Option<&Value>,
    ) -> Result<ExecutionRequest, ApiError> {
        self.admit(client_key).await?;
        let request = validate(language, code)?.with_timeout_ms(self.timeout_ms);
        debug!(client = %client_key, language = %request.language, "Request accepted");
        Ok(request)
    }

    /// Count the request against the client's window
    pub async fn admit(&self, client_key: &str) -> Result<(), ApiError> {
        let decision = self.limiter.hit(client_key).await?;
        if decision.allowed {
            return Ok(());
        }

        let retry_after_secs = (decision.window_reset_at - Utc::now())
            .num_seconds()
            .max(1) as u64;
        warn!(client = %client_key, count = decision.count, "Rate limit exceeded");
        Err(ApiError::RateLimited {
            message: self.limit_message(),
            retry_after_secs,
        })
    }

    fn limit_message(&self) -> String {
        if self.window_ms == 60_000 {
            format!(
                "Rate limit exceeded. Max {} runs per minute.",
                self.max_requests
            )
        } else {
            format!(
                "Rate limit exceeded. Max {} runs per {} seconds.",
                self.max_requests,
                self.window_ms / 1000
            )
        }
    }
}

pub fn validate(language: Option<&str>, code: Option<&Value>) -> Result<ExecutionRequest, ApiError> {
    let language = language.and_then(Language::parse_id).ok_or_else(|| {
        ApiError::Validation(format!(
            "Unsupported language. Supported: {}",
            Language::supported_list()
        ))
    })?;

    let code = match code {
        Some(Value::String(code)) if !code.is_empty() => code,
        _ => return Err(ApiError::Validation("Code is required.".to_string())),
    };

    if code.len() > MAX_SOURCE_BYTES {
        return Err(ApiError::Validation("Code too large (max 50KB).".to_string()));
    }

    Ok(ExecutionRequest::new(language, code.as_str()))
}

/// Identity used for rate limiting. Behind a trusted proxy the first
/// `X-Forwarded-For` hop is the caller.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = forwarded {
            return hop.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::MemoryRateLimitStore;
    use serde_json::json;

    fn gate(max: u32) -> RequestGate {
        RequestGate::new(Arc::new(MemoryRateLimitStore::new(max, 60_000)), max, 60_000, 5_000)
    }

    fn message(err: ApiError) -> String {
        err.to_string()
    }

    #[test]
    fn test_valid_request() {
        let code = json!("print(1+1)");
        let request = validate(Some("python"), Some(&code)).unwrap();
        assert_eq!(request.language, Language::Python);
        assert_eq!(request.source_code, "print(1+1)");
    }

    #[test]
    fn test_unsupported_or_missing_language() {
        let code = json!("x");
        for language in [Some("cobol"), Some("Python"), Some(""), None] {
            let err = validate(language, Some(&code)).unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)));
            let text = message(err);
            assert!(text.starts_with("Unsupported language. Supported: python, node"));
            assert!(text.ends_with("bash"));
        }
    }

    #[test]
    fn test_missing_empty_or_non_string_code() {
        for code in [None, Some(json!("")), Some(json!(42)), Some(json!(["print(1)"])), Some(Value::Null)] {
            let err = validate(Some("python"), code.as_ref()).unwrap_err();
            assert_eq!(message(err), "Code is required.");
        }
    }

    #[test]
    fn test_size_limit_boundary() {
        let at_limit = json!("a".repeat(MAX_SOURCE_BYTES));
        assert!(validate(Some("bash"), Some(&at_limit)).is_ok());

        let over = json!("a".repeat(MAX_SOURCE_BYTES + 1));
        let err = validate(Some("bash"), Some(&over)).unwrap_err();
        assert_eq!(message(err), "Code too large (max 50KB).");
    }

    #[tokio::test]
    async fn test_accept_applies_configured_timeout() {
        let code = json!("console.log(1)");
        let request = gate(10).accept("c", Some("node"), Some(&code)).await.unwrap();
        assert_eq!(request.timeout_ms, 5_000);
    }

    #[tokio::test]
    async fn test_rate_limit_checked_before_validation() {
        let gate = gate(1);
        let bad = json!("");

        // Invalid request still consumes the window
        let first = gate.accept("c", Some("python"), Some(&bad)).await.unwrap_err();
        assert!(matches!(first, ApiError::Validation(_)));

        let good = json!("print(1)");
        let second = gate.accept("c", Some("python"), Some(&good)).await.unwrap_err();
        match second {
            ApiError::RateLimited { message, retry_after_secs } => {
                assert_eq!(message, "Rate limit exceeded. Max 1 runs per minute.");
                assert!(retry_after_secs >= 1 && retry_after_secs <= 60);
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
    }

    #[test]
    fn test_client_key_prefers_peer_without_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "192.0.2.4:51000".parse().unwrap();

        assert_eq!(client_key(&headers, Some(peer), false), "192.0.2.4");
        assert_eq!(client_key(&headers, Some(peer), true), "203.0.113.9");
        assert_eq!(client_key(&HeaderMap::new(), None, true), "unknown");
    }
}
