// HTTP route handlers for the SkyForge API

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skyforge_common::types::ExecutionResult;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::gate;
use crate::metrics;
use crate::AppState;

/// Fields are loosely typed so that shape errors become validation messages
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub code: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub success: bool,
    pub output: String,
    pub error: String,
    pub exit_code: i64,
    pub execution_time: u64,
}

impl From<ExecutionResult> for RunResponse {
    fn from(result: ExecutionResult) -> Self {
        Self {
            success: result.success(),
            exit_code: result.exit_code,
            execution_time: result.duration_ms,
            output: result.stdout,
            error: result.stderr,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub ready: bool,
    pub images: BTreeMap<&'static str, bool>,
}

/// POST /api/code/run - Execute one program
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<RunResponse>, ApiError> {
    let client = gate::client_key(
        &headers,
        connect_info.map(|ConnectInfo(addr)| addr),
        state.trust_proxy,
    );

    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            state.gate.admit(&client).await?;
            return Err(ApiError::Validation(rejection.body_text()));
        }
    };

    let request = state
        .gate
        .accept(&client, body.language.as_deref(), body.code.as_ref())
        .await?;

    let result = state.orchestrator.execute(&request).await;
    metrics::record_execution(&result);

    info!(
        client = %client,
        language = %request.language,
        tier = %result.tier_used,
        exit_code = result.exit_code,
        "Run completed"
    );

    Ok(Json(RunResponse::from(result)))
}

/// GET /api/code/status - Primary sandbox image readiness
pub async fn code_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let images: BTreeMap<&'static str, bool> = state
        .sandbox
        .image_availability()
        .await
        .into_iter()
        .map(|(lang, present)| (lang.as_str(), present))
        .collect();
    let ready = images.values().all(|present| *present);

    Json(StatusResponse { ready, images })
}

/// GET /health - Liveness probe
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /metrics - Prometheus exposition
pub async fn metrics_endpoint() -> Result<impl IntoResponse, ApiError> {
    let body = metrics::render().map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
