use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::coordinator::{SwarmCoordinator, SwarmStatus, TaskStatusReport};
use crate::error::SwarmError;
use crate::scheduler::Capability;

/// Longest a single wait request may block.
const MAX_WAIT_SECS: u64 = 300;

#[derive(Clone)]
pub struct DashboardState {
    pub coordinator: Arc<SwarmCoordinator>,
}

#[derive(Debug, Deserialize)]
pub struct AddressTaskRequest {
    pub address: String,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    pub task_type: String,
    pub target_address: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitTaskResponse {
    pub task_id: String,
}

#[derive(Debug, Deserialize)]
pub struct WaitQuery {
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
struct WaitResponse {
    finished: bool,
    task: TaskStatusReport,
}

#[derive(Debug, Deserialize)]
pub struct RegisterWorkerRequest {
    pub worker_id: String,
    pub worker_type: String,
    pub capabilities: BTreeSet<Capability>,
}

/// Maps coordinator errors onto HTTP responses.
struct ApiError(SwarmError);

impl From<SwarmError> for ApiError {
    fn from(e: SwarmError) -> Self {
        Self(e)
    }
}

/// Malformed, missing or mistyped request bodies surface as the same
/// `{"error": ...}` 400 response as other invalid input.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(SwarmError::InvalidParameters(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SwarmError::UnknownTaskType(_)
            | SwarmError::InvalidParameters(_)
            | SwarmError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            SwarmError::TaskNotFound(_) | SwarmError::WorkerNotFound(_) => StatusCode::NOT_FOUND,
            SwarmError::WorkerBusy(_) => StatusCode::CONFLICT,
            SwarmError::QueueFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/swarm", get(swarm_status_handler))
        .route("/api/tasks", post(submit_task_handler))
        .route("/api/tasks/wallet", post(submit_wallet_handler))
        .route("/api/tasks/token", post(submit_token_handler))
        .route("/api/tasks/transaction", post(submit_transaction_handler))
        .route("/api/tasks/{task_id}", get(task_status_handler))
        .route("/api/tasks/{task_id}/wait", get(wait_handler))
        .route("/api/workers", post(register_worker_handler))
        .route("/api/workers/{worker_id}/heartbeat", post(heartbeat_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState, shutdown: CancellationToken) {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting HTTP API");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind HTTP API");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    {
        tracing::error!(error = %e, "HTTP API failed");
    }
}

async fn swarm_status_handler(State(state): State<DashboardState>) -> Json<SwarmStatus> {
    Json(state.coordinator.get_swarm_status().await)
}

async fn submit_task_handler(
    State(state): State<DashboardState>,
    payload: Result<Json<SubmitTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitTaskResponse>), ApiError> {
    let Json(payload) = payload?;
    let task_id = state
        .coordinator
        .submit_raw(
            &payload.task_type,
            &payload.target_address,
            payload.parameters,
            payload.priority,
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitTaskResponse { task_id })))
}

async fn submit_wallet_handler(
    State(state): State<DashboardState>,
    payload: Result<Json<AddressTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitTaskResponse>), ApiError> {
    let Json(payload) = payload?;
    let task_id = state
        .coordinator
        .submit_wallet_analysis_task(&payload.address, payload.priority)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitTaskResponse { task_id })))
}

async fn submit_token_handler(
    State(state): State<DashboardState>,
    payload: Result<Json<AddressTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitTaskResponse>), ApiError> {
    let Json(payload) = payload?;
    let task_id = state
        .coordinator
        .submit_token_analysis_task(&payload.address, payload.priority)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitTaskResponse { task_id })))
}

async fn submit_transaction_handler(
    State(state): State<DashboardState>,
    payload: Result<Json<AddressTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitTaskResponse>), ApiError> {
    let Json(payload) = payload?;
    let task_id = state
        .coordinator
        .submit_transaction_analysis_task(&payload.address, payload.priority)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitTaskResponse { task_id })))
}

async fn task_status_handler(
    State(state): State<DashboardState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusReport>, ApiError> {
    state
        .coordinator
        .get_task_status(&task_id)
        .await
        .map(Json)
        .ok_or(ApiError(SwarmError::TaskNotFound(task_id)))
}

async fn wait_handler(
    State(state): State<DashboardState>,
    Path(task_id): Path<String>,
    Query(query): Query<WaitQuery>,
) -> Result<Json<WaitResponse>, ApiError> {
    let timeout = Duration::from_secs(query.timeout_secs.unwrap_or(30).min(MAX_WAIT_SECS));
    let outcome = state
        .coordinator
        .wait_for_completion(&task_id, timeout)
        .await?;
    Ok(Json(WaitResponse {
        finished: outcome.is_finished(),
        task: outcome.into_report(),
    }))
}

async fn register_worker_handler(
    State(state): State<DashboardState>,
    payload: Result<Json<RegisterWorkerRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(payload) = payload?;
    state
        .coordinator
        .register_worker(&payload.worker_id, &payload.worker_type, payload.capabilities)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn heartbeat_handler(
    State(state): State<DashboardState>,
    Path(worker_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.coordinator.heartbeat(&worker_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
