// Fallback B: Judge0 submissions API in blocking mode (`wait=true`)
// Source and outputs travel base64-encoded.

use crate::error::{ExecutionError, ProviderError};
use crate::registry::spec_for;
use crate::tier::{ExecutionTier, TierOutput};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use skyforge_common::config::Config;
use skyforge_common::types::{ExecutionRequest, Tier};
use tracing::{debug, warn};

/// Judge0 status id for "Accepted"
const STATUS_ACCEPTED: u32 = 3;

#[derive(Debug, Serialize)]
struct SubmissionRequest {
    language_id: u32,
    source_code: String,
}

#[derive(Debug, Deserialize)]
struct Submission {
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
    #[serde(default)]
    compile_output: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<SubmissionStatus>,
}

#[derive(Debug, Deserialize)]
struct SubmissionStatus {
    id: u32,
    #[serde(default)]
    description: String,
}

pub struct Judge0Provider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    configured: bool,
}

impl Judge0Provider {
    pub fn new(client: Client, base_url: String, api_key: Option<String>, configured: bool) -> Self {
        Self {
            client,
            base_url,
            api_key,
            configured,
        }
    }

    pub fn from_config(client: Client, config: &Config) -> Self {
        Self::new(
            client,
            config.judge0_base_url().to_string(),
            config.judge0_api_key.clone(),
            config.judge0_configured(),
        )
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<TierOutput, ProviderError> {
        // No credentials: fail before touching the network
        if !self.configured {
            return Err(ProviderError::NotConfigured(
                "Judge0 is not configured (set JUDGE0_API_KEY or JUDGE0_URL)".to_string(),
            ));
        }
        let language_id = spec_for(request.language)
            .judge0_id
            .ok_or(ProviderError::UnsupportedLanguage(request.language))?;

        let body = SubmissionRequest {
            language_id,
            source_code: general_purpose::STANDARD.encode(&request.source_code),
        };

        let mut http = self
            .client
            .post(format!("{}/submissions", self.base_url))
            .query(&[("base64_encoded", "true"), ("wait", "true")])
            .json(&body);
        if let Some(key) = &self.api_key {
            http = http
                .header("X-RapidAPI-Key", key)
                .header("X-RapidAPI-Host", rapidapi_host(&self.base_url));
        }

        let response = http.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http(format!("Judge0 API error {}: {}", status, text)));
        }

        let submission: Submission = response.json().await?;
        to_output(submission)
    }
}

/// RapidAPI routes on the bare host name of the endpoint
fn rapidapi_host(base_url: &str) -> String {
    reqwest::Url::parse(base_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| base_url.to_string())
}

/// Judge0 wraps base64 output at 60 columns
fn decode_field(field: &Option<String>, name: &str) -> Result<String, ProviderError> {
    let Some(encoded) = field else {
        return Ok(String::new());
    };
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| ProviderError::InvalidResponse(format!("{} is not valid base64: {}", name, e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn to_output(submission: Submission) -> Result<TierOutput, ProviderError> {
    let stdout = decode_field(&submission.stdout, "stdout")?;
    let stderr = decode_field(&submission.stderr, "stderr")?;
    let compile_output = decode_field(&submission.compile_output, "compile_output")?;
    let message = decode_field(&submission.message, "message")?;

    let accepted = submission
        .status
        .as_ref()
        .is_some_and(|status| status.id == STATUS_ACCEPTED);

    let mut diagnostics: Vec<String> = [stderr, compile_output, message]
        .into_iter()
        .filter(|part| !part.trim().is_empty())
        .collect();
    if !accepted && diagnostics.is_empty() {
        if let Some(status) = &submission.status {
            diagnostics.push(status.description.clone());
        }
    }

    Ok(TierOutput {
        stdout,
        stderr: diagnostics.join("\n"),
        exit_code: if accepted { 0 } else { 1 },
        timed_out: false,
    })
}

#[async_trait]
impl ExecutionTier for Judge0Provider {
    fn tier(&self) -> Tier {
        Tier::FallbackB
    }

    async fn attempt(&self, request: &ExecutionRequest) -> Result<TierOutput, ExecutionError> {
        debug!(language = %request.language, "Submitting to Judge0");
        self.execute(request).await.map_err(|e| {
            warn!(language = %request.language, error = %e, "Judge0 execution failed");
            ExecutionError::provider(Tier::FallbackB, e)
        })
    }
}
