use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use ledgerdeck_core::sync_jobs::SyncJob;

use crate::error::{ApiError, ApiResult};
use crate::main_lib::AppState;

async fn list_sync_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<SyncJob>> {
    Json(state.coordinator.sync_job_snapshots())
}

async fn get_sync_job(
    State(state): State<Arc<AppState>>,
    Path(job_key): Path<String>,
) -> Json<SyncJob> {
    Json(state.coordinator.get_sync_job_snapshot(&job_key))
}

/// Returns a job to idle, typically when the wallet or account leaves view.
async fn reset_sync_job(
    State(state): State<Arc<AppState>>,
    Path(job_key): Path<String>,
) -> ApiResult<Json<SyncJob>> {
    state
        .coordinator
        .reset_sync_job(&job_key)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No sync job '{}'", job_key)))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync/jobs", get(list_sync_jobs))
        .route("/sync/jobs/{key}", get(get_sync_job).delete(reset_sync_job))
}
