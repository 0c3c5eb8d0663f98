//! REST handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::error::{ApiError, ApiResponse};
use super::files::{self, ResultFile};
use super::ServerState;
use crate::execution::{RunId, RunSpec, RunSummary, StartedRun};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub running: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAllRequest {
    pub profile: String,
    pub environment: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
}

impl From<RunAllRequest> for RunSpec {
    fn from(request: RunAllRequest) -> Self {
        RunSpec {
            auth_token: request.auth_token,
            run_id: request.run_id,
            ..RunSpec::all(&request.profile, &request.environment)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    pub run_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResponse {
    pub run_id: RunId,
    pub stopped: bool,
}

pub async fn health(State(state): State<Arc<ServerState>>) -> Json<ApiResponse<HealthStatus>> {
    Json(ApiResponse::success(HealthStatus {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        running: state.orchestrator.list_running().len(),
    }))
}

pub async fn list_tests(State(state): State<Arc<ServerState>>) -> ApiResult<Vec<String>> {
    let dir = state.orchestrator.settings().tests_path();
    Ok(Json(ApiResponse::success(files::list_test_scripts(&dir).await?)))
}

pub async fn run_test(
    State(state): State<Arc<ServerState>>,
    Json(spec): Json<RunSpec>,
) -> Result<(StatusCode, Json<ApiResponse<StartedRun>>), ApiError> {
    start(&state, spec).await
}

pub async fn run_all(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<RunAllRequest>,
) -> Result<(StatusCode, Json<ApiResponse<StartedRun>>), ApiError> {
    start(&state, request.into()).await
}

async fn start(
    state: &ServerState,
    spec: RunSpec,
) -> Result<(StatusCode, Json<ApiResponse<StartedRun>>), ApiError> {
    let started = state.orchestrator.start(spec).await?;
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(started))))
}

pub async fn stop_test(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<StopRequest>,
) -> ApiResult<StopResponse> {
    let run_id = RunId::from(request.run_id);
    let stopped = state.orchestrator.stop(&run_id)?;
    Ok(Json(ApiResponse::success(StopResponse { run_id, stopped })))
}

pub async fn running(State(state): State<Arc<ServerState>>) -> Json<ApiResponse<Vec<RunSummary>>> {
    Json(ApiResponse::success(state.orchestrator.snapshot()))
}

pub async fn list_results(State(state): State<Arc<ServerState>>) -> ApiResult<Vec<ResultFile>> {
    let dir = state.orchestrator.settings().results_path();
    Ok(Json(ApiResponse::success(files::list_result_files(&dir).await?)))
}

pub async fn get_result(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> ApiResult<Value> {
    let dir = state.orchestrator.settings().results_path();
    Ok(Json(ApiResponse::success(
        files::read_result_file(&dir, &name).await?,
    )))
}
