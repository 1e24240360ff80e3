use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::header::{HeaderName, AUTHORIZATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, ParamPatch};
use crate::engine::sound::SoundSnapshot;
use crate::error::{ConfigError, ErrorCode};

use super::{sse, DebugSources};

/// Shared application state for HTTP handlers.
#[derive(Clone)]
pub struct DebugHttpState {
    pub sources: DebugSources,
    token: Arc<String>,
    started: Instant,
}

impl DebugHttpState {
    pub fn new(sources: DebugSources, token: String) -> Self {
        Self {
            sources,
            token: Arc::new(token),
            started: Instant::now(),
        }
    }

    fn authorize(
        &self,
        headers: &HeaderMap,
        query_token: Option<&str>,
    ) -> Result<(), HttpServerError> {
        let provided = extract_token(headers, query_token);
        match provided {
            Some(value) if value == *self.token => Ok(()),
            _ => Err(HttpServerError::Unauthorized),
        }
    }
}

/// Query payload for extracting token from URL.
#[derive(Debug, Default, Deserialize)]
pub struct AuthQuery {
    pub token: Option<String>,
}

/// HTTP error variants mapped to JSON responses.
#[derive(Debug)]
pub enum HttpServerError {
    Unauthorized,
    InvalidParams(ConfigError),
    Internal(String),
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "error": "missing or invalid token" }),
            ),
            Self::InvalidParams(err) => {
                let status = match err {
                    ConfigError::LockPoisoned => StatusCode::INTERNAL_SERVER_ERROR,
                    _ => StatusCode::BAD_REQUEST,
                };
                (
                    status,
                    serde_json::json!({ "error": err.message(), "code": err.code() }),
                )
            }
            Self::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": msg }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Health endpoint response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u64,
    pub sounds: usize,
}

/// Sound listing response payload.
#[derive(Debug, Serialize)]
pub struct SoundsResponse {
    pub sounds: Vec<SoundSnapshot>,
}

/// Parameter description payload.
#[derive(Debug, Serialize)]
pub struct ParamDescriptor {
    pub supported: &'static [&'static str],
    pub current: EngineConfig,
}

/// Build the Axum router with all handlers.
pub fn build_router(state: DebugHttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sounds", get(sounds))
        .route("/events", get(event_stream_handler))
        .route("/params", get(list_params).post(apply_params))
        .with_state(state)
}

/// Run the HTTP server loop.
pub async fn run_http_server(state: DebugHttpState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding debug HTTP listener")?;
    let router = build_router(state);
    axum::serve(listener, router)
        .await
        .context("serving debug HTTP router")?;
    Ok(())
}

pub async fn health(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<HealthResponse>, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;

    Ok(Json(HealthResponse {
        status: "ok",
        uptime_ms: state.started.elapsed().as_millis() as u64,
        sounds: state.sources.sounds.borrow().len(),
    }))
}

pub async fn sounds(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<SoundsResponse>, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;

    let sounds = state.sources.sounds.borrow().clone();
    Ok(Json(SoundsResponse { sounds }))
}

pub async fn event_stream_handler(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<sse::EngineEventStream, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;
    Ok(sse::engine_events(&state.sources.events))
}

pub async fn list_params(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<ParamDescriptor>, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;

    Ok(Json(ParamDescriptor {
        supported: &[
            "motion_threshold",
            "motion_hysteresis",
            "idle_beep_interval_ms",
            "beep_duration_ms",
            "base_volume",
        ],
        current: state.sources.config.snapshot(),
    }))
}

pub async fn apply_params(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
    Json(patch): Json<ParamPatch>,
) -> Result<Json<EngineConfig>, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;

    let updated = state
        .sources
        .config
        .apply_patch(&patch)
        .map_err(HttpServerError::InvalidParams)?;
    log::info!("[DebugHttp] Applied parameter patch {:?}", patch);
    Ok(Json(updated))
}

fn extract_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    if let Some(token) = query_token {
        return Some(token.to_string());
    }

    static X_DEBUG_TOKEN: HeaderName = HeaderName::from_static("x-debug-token");

    headers
        .get(&X_DEBUG_TOKEN)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| raw.strip_prefix("Bearer ").map(|v| v.to_string()))
        })
}
