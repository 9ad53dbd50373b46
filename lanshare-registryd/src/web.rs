//! HTTP surface for the rendezvous server: `/register`, `/unregister`,
//! `/heartbeat`, `/peers`, plus an ambient `/api/v1/health` operators can
//! point a container healthcheck at.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::server::{RegisteredPeer, RegistryState};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request body: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        let body = Json(StatusResponse {
            status: "error",
            message: Some(self.to_string()),
        });
        (status, body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    address: String,
    port: u16,
}

#[derive(Deserialize)]
struct UsernameRequest {
    username: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
    peer_count: usize,
}

pub fn router(state: Arc<RegistryState>) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/unregister", post(unregister))
        .route("/heartbeat", post(heartbeat))
        .route("/peers", get(list_peers))
        .route("/api/v1/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn register(
    State(state): State<Arc<RegistryState>>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(req) = body?;
    state.register(&req.username, &req.address, req.port);
    Ok(Json(StatusResponse {
        status: "registered",
        message: None,
    }))
}

async fn unregister(
    State(state): State<Arc<RegistryState>>,
    body: Result<Json<UsernameRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(req) = body?;
    state.unregister(&req.username);
    Ok(Json(StatusResponse {
        status: "unregistered",
        message: None,
    }))
}

async fn heartbeat(
    State(state): State<Arc<RegistryState>>,
    body: Result<Json<UsernameRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(req) = body?;
    state.heartbeat(&req.username);
    Ok(Json(StatusResponse {
        status: "success",
        message: None,
    }))
}

async fn list_peers(State(state): State<Arc<RegistryState>>) -> Json<Vec<RegisteredPeer>> {
    Json(state.list_peers())
}

async fn health(State(state): State<Arc<RegistryState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.uptime_secs(),
        peer_count: state.peer_count(),
    })
}
