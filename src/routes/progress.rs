//! Progress endpoints

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use super::Caller;
use crate::error::CoreError;
use crate::progress::{self, CertificateRequest, ProgressView};
use crate::state::AppState;

/// GET /progress/:course_id
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(course_id): Path<String>,
) -> Result<Json<ProgressView>, CoreError> {
    progress::get_progress(&state.pool, caller.id(), &course_id)
        .await
        .map(Json)
}

/// POST /progress/:course_id/lectures/:lecture_id/viewed
pub async fn record_lecture_viewed(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path((course_id, lecture_id)): Path<(String, String)>,
) -> Result<Json<ProgressView>, CoreError> {
    progress::record_lecture_viewed(&state.pool, caller.id(), &course_id, &lecture_id)
        .await
        .map(Json)
}

/// POST /progress/:course_id/complete
pub async fn mark_completed(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(course_id): Path<String>,
) -> Result<Json<ProgressView>, CoreError> {
    progress::mark_completed(&state.pool, caller.id(), &course_id)
        .await
        .map(Json)
}

/// POST /progress/:course_id/incomplete
pub async fn mark_incomplete(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(course_id): Path<String>,
) -> Result<Json<ProgressView>, CoreError> {
    progress::mark_incomplete(&state.pool, caller.id(), &course_id)
        .await
        .map(Json)
}

/// GET /progress/:course_id/certificate
pub async fn certificate(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(course_id): Path<String>,
) -> Result<Json<CertificateRequest>, CoreError> {
    progress::certificate_for(&state.pool, caller.id(), &course_id)
        .await
        .map(Json)
}
