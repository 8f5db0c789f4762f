// Fallback A: Piston compile-and-run API
// One synchronous POST per request; output comes back in the response body.

use crate::error::{ExecutionError, ProviderError};
use crate::registry::spec_for;
use crate::tier::{ExecutionTier, TierOutput};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use skyforge_common::config::Config;
use skyforge_common::types::{ExecutionRequest, Tier};
use tracing::{debug, warn};

/// Piston resolves "*" to the newest installed runtime version
const LATEST_VERSION: &str = "*";

#[derive(Debug, Serialize)]
struct PistonRequest<'a> {
    language: &'a str,
    version: &'a str,
    files: Vec<PistonFile<'a>>,
}

#[derive(Debug, Serialize)]
struct PistonFile<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct PistonResponse {
    #[serde(default)]
    compile: Option<PistonStage>,
    #[serde(default)]
    run: Option<PistonStage>,
}

#[derive(Debug, Default, Deserialize)]
struct PistonStage {
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    signal: Option<String>,
}

impl PistonStage {
    fn failed(&self) -> bool {
        self.code.map_or(self.signal.is_some(), |code| code != 0)
    }

    fn stderr_with_signal(&self) -> String {
        let mut stderr = self.stderr.clone().unwrap_or_default();
        if let Some(signal) = &self.signal {
            if !stderr.is_empty() {
                stderr.push('\n');
            }
            stderr.push_str(&format!("Process killed by signal {}", signal));
        }
        stderr
    }
}

pub struct PistonProvider {
    client: Client,
    base_url: Option<String>,
    api_key: Option<String>,
}

impl PistonProvider {
    pub fn new(client: Client, base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    pub fn from_config(client: Client, config: &Config) -> Self {
        Self::new(client, config.piston_url.clone(), config.piston_api_key.clone())
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<TierOutput, ProviderError> {
        let base_url = self.base_url.as_deref().ok_or_else(|| {
            ProviderError::NotConfigured("Piston is disabled (PISTON_URL is empty)".to_string())
        })?;
        let runtime = spec_for(request.language)
            .piston_runtime
            .ok_or(ProviderError::UnsupportedLanguage(request.language))?;

        let body = PistonRequest {
            language: runtime,
            version: LATEST_VERSION,
            files: vec![PistonFile {
                content: &request.source_code,
            }],
        };

        let mut http = self
            .client
            .post(format!("{}/execute", base_url))
            .header(ACCEPT, "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            http = http.header(AUTHORIZATION, key);
        }

        let response = http.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Rejected {
                    status: status.as_u16(),
                    body,
                },
                _ => ProviderError::Http(format!("Piston API error {}: {}", status, body)),
            });
        }

        let data: PistonResponse = response.json().await?;
        to_output(data)
    }
}

fn to_output(data: PistonResponse) -> Result<TierOutput, ProviderError> {
    // A failed compile stage means the run stage never happened
    if let Some(compile) = data.compile.as_ref().filter(|stage| stage.failed()) {
        let mut stderr = compile.stderr_with_signal();
        if let Some(stdout) = compile.stdout.as_deref().filter(|s| !s.is_empty()) {
            stderr = format!("{}\n{}", stdout, stderr);
        }
        return Ok(TierOutput {
            stdout: String::new(),
            stderr,
            exit_code: compile.code.unwrap_or(1),
            timed_out: false,
        });
    }

    let run = data
        .run
        .ok_or_else(|| ProviderError::InvalidResponse("response has no run stage".to_string()))?;

    Ok(TierOutput {
        stdout: run.stdout.clone().unwrap_or_default(),
        stderr: run.stderr_with_signal(),
        exit_code: run.code.unwrap_or(1),
        timed_out: false,
    })
}

#[async_trait]
impl ExecutionTier for PistonProvider {
    fn tier(&self) -> Tier {
        Tier::FallbackA
    }

    async fn attempt(&self, request: &ExecutionRequest) -> Result<TierOutput, ExecutionError> {
        debug!(language = %request.language, "Submitting to Piston");
        self.execute(request).await.map_err(|e| {
            warn!(language = %request.language, error = %e, "Piston execution failed");
            ExecutionError::provider(Tier::FallbackA, e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_support::spawn_mock;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use skyforge_common::types::Language;
    use std::sync::{Arc, Mutex};

    type Recorded = Arc<Mutex<Vec<(HeaderMap, Value)>>>;

    async fn mock_piston(status: AxumStatus, reply: Value) -> (String, Recorded) {
        let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/execute",
                post(
                    move |State(rec): State<Recorded>, headers: HeaderMap, Json(body): Json<Value>| {
                        let reply = reply.clone();
                        async move {
                            rec.lock().unwrap().push((headers, body));
                            (status, Json(reply))
                        }
                    },
                ),
            )
            .with_state(recorded.clone());
        (spawn_mock(app).await, recorded)
    }

    fn provider(base_url: String, api_key: Option<&str>) -> PistonProvider {
        PistonProvider::new(
            crate::providers::http_client().unwrap(),
            Some(base_url),
            api_key.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn test_successful_run() {
        let (url, recorded) = mock_piston(
            AxumStatus::OK,
            json!({
                "language": "node",
                "version": "18.15.0",
                "run": { "stdout": "2\n", "stderr": "", "code": 0, "signal": null, "output": "2\n" }
            }),
        )
        .await;

        let request = ExecutionRequest::new(Language::Javascript, "console.log(1+1)");
        let output = provider(url, Some("piston-key")).attempt(&request).await.unwrap();

        assert_eq!(output.stdout, "2\n");
        assert_eq!(output.exit_code, 0);

        let calls = recorded.lock().unwrap();
        let (headers, body) = &calls[0];
        assert_eq!(body["language"], "node");
        assert_eq!(body["version"], "*");
        assert_eq!(body["files"][0]["content"], "console.log(1+1)");
        assert_eq!(headers["authorization"], "piston-key");
    }

    #[tokio::test]
    async fn test_unauthorized_is_rejected() {
        let (url, _) = mock_piston(
            AxumStatus::UNAUTHORIZED,
            json!({ "message": "Public Piston API is now whitelist only" }),
        )
        .await;

        let request = ExecutionRequest::new(Language::Python, "print(1)");
        let err = provider(url, None).attempt(&request).await.unwrap_err();

        assert!(err.escalates());
        match err {
            ExecutionError::Provider {
                tier: Tier::FallbackA,
                source: ProviderError::Rejected { status, body },
            } => {
                assert_eq!(status, 401);
                assert!(body.contains("whitelist"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_http_error() {
        let (url, _) = mock_piston(AxumStatus::BAD_GATEWAY, json!({})).await;
        let request = ExecutionRequest::new(Language::Python, "print(1)");
        let err = provider(url, None).attempt(&request).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Provider {
                source: ProviderError::Http(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_compile_failure_surfaces_diagnostics() {
        let (url, _) = mock_piston(
            AxumStatus::OK,
            json!({
                "compile": { "stdout": "", "stderr": "main.c:1: error: expected ';'", "code": 1, "signal": null }
            }),
        )
        .await;

        let request = ExecutionRequest::new(Language::C, "int main(){return 0}");
        let output = provider(url, None).attempt(&request).await.unwrap();
        assert_eq!(output.exit_code, 1);
        assert!(output.stderr.contains("expected ';'"));
        assert!(output.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_signal_kill_reports_failure() {
        let (url, _) = mock_piston(
            AxumStatus::OK,
            json!({ "run": { "stdout": "", "stderr": "", "code": null, "signal": "SIGKILL" } }),
        )
        .await;

        let request = ExecutionRequest::new(Language::Python, "while True: pass");
        let output = provider(url, None).attempt(&request).await.unwrap();
        assert_eq!(output.exit_code, 1);
        assert!(output.stderr.contains("SIGKILL"));
    }

    #[tokio::test]
    async fn test_disabled_provider_is_not_configured() {
        let disabled = PistonProvider::new(crate::providers::http_client().unwrap(), None, None);
        let request = ExecutionRequest::new(Language::Python, "print(1)");
        let err = disabled.attempt(&request).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Provider {
                source: ProviderError::NotConfigured(_),
                ..
            }
        ));
    }
}
