//! Catalog endpoints

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use super::{Caller, ValidJson};
use crate::catalog::{self, CreateCourse, CreateLecture};
use crate::error::CoreError;
use crate::model::{Course, Lecture};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PublishRequest {
    pub published: bool,
}

/// GET /courses
pub async fn list_courses(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Course>>, CoreError> {
    catalog::list_published(&state.pool).await.map(Json)
}

/// GET /courses/:course_id
pub async fn get_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> Result<Json<Course>, CoreError> {
    catalog::get_course(&state.pool, &course_id).await.map(Json)
}

/// POST /courses
pub async fn create_course(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    ValidJson(req): ValidJson<CreateCourse>,
) -> Result<Json<Course>, CoreError> {
    catalog::create_course(&state.pool, caller.id(), &req)
        .await
        .map(Json)
}

/// POST /courses/:course_id/lectures
pub async fn add_lecture(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(course_id): Path<String>,
    ValidJson(req): ValidJson<CreateLecture>,
) -> Result<Json<Lecture>, CoreError> {
    catalog::add_lecture(&state.pool, caller.id(), &course_id, &req)
        .await
        .map(Json)
}

/// DELETE /courses/:course_id/lectures/:lecture_id
pub async fn remove_lecture(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path((course_id, lecture_id)): Path<(String, String)>,
) -> Result<Json<Course>, CoreError> {
    catalog::remove_lecture(&state.pool, caller.id(), &course_id, &lecture_id)
        .await
        .map(Json)
}

/// POST /courses/:course_id/publish
pub async fn set_published(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(course_id): Path<String>,
    ValidJson(req): ValidJson<PublishRequest>,
) -> Result<Json<Course>, CoreError> {
    catalog::set_published(&state.pool, caller.id(), &course_id, req.published)
        .await
        .map(Json)
}
