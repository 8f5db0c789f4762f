// Route table and middleware for the SkyForge API

use axum::extract::DefaultBodyLimit;
use axum::http::{header, request::Parts, HeaderValue, Method};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Request bodies above this are refused before JSON parsing
const BODY_LIMIT_BYTES: usize = 1024 * 1024;

const LOCAL_FRONTEND: &str = "http://localhost:3000";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/code/run", post(handlers::run_code))
        .route("/api/code/status", get(handlers::code_status))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_endpoint))
}

/// Full application: routes, state, and middleware
pub fn app(state: Arc<AppState>, frontend_url: Option<String>) -> Router {
    routes()
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors_layer(frontend_url))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn cors_layer(frontend_url: Option<String>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _parts: &Parts| {
            origin
                .to_str()
                .map(|origin| origin_allowed(origin, frontend_url.as_deref()))
                .unwrap_or(false)
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Configured frontend, local dev server, or a Vercel deployment
pub fn origin_allowed(origin: &str, frontend_url: Option<&str>) -> bool {
    frontend_url.is_some_and(|url| url == origin)
        || origin == LOCAL_FRONTEND
        || origin.ends_with(".vercel.app")
}
