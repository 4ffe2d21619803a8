//! Course progress tracker.
//!
//! Per (user, course) state machine: `NoRecord` → `InProgress` → `Completed`,
//! with explicit overrides in both directions. Every operation passes the
//! access gate first, then resolves the course from the catalog.

use crate::access::require_enrollment;
use crate::db::{self, Pool};
use crate::error::{storage, CoreError, CoreResult};
use crate::model::{Course, CourseProgress, LectureProgress, ProgressState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

/// What a client needs to render a course together with the caller's progress.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressView {
    pub course: Course,
    pub progress: Vec<LectureProgress>,
    pub completed: bool,
    pub state: ProgressState,
}

impl ProgressView {
    fn new(course: Course, record: Option<CourseProgress>) -> Self {
        let state = ProgressState::of(record.as_ref());
        match record {
            Some(r) => Self {
                course,
                progress: r.lecture_progress,
                completed: r.completed,
                state,
            },
            None => Self {
                course,
                progress: Vec::new(),
                completed: false,
                state,
            },
        }
    }
}

/// Plain values handed to the external certificate renderer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CertificateRequest {
    pub user_name: String,
    pub course_title: String,
    pub completed_at: DateTime<Utc>,
}

fn require_id<'a>(field: &str, value: &'a str) -> CoreResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CoreError::InvalidRequest(format!("{} is required", field)));
    }
    Ok(value)
}

async fn load_course(pool: &Pool, user_id: &str, course_id: &str) -> CoreResult<Course> {
    db::get_course_by_id(pool, course_id)
        .await
        .map_err(storage("load_course", user_id, course_id))?
        .ok_or_else(|| CoreError::CourseNotFound(course_id.to_string()))
}

#[instrument(skip_all)]
pub async fn get_progress(
    pool: &Pool,
    caller: Option<&str>,
    course_id: &str,
) -> CoreResult<ProgressView> {
    let course_id = require_id("course_id", course_id)?;
    let user_id = require_enrollment(pool, caller, course_id).await?;
    let course = load_course(pool, &user_id, course_id).await?;
    let record = db::get_progress(pool, &user_id, course_id)
        .await
        .map_err(storage("get_progress", &user_id, course_id))?;
    Ok(ProgressView::new(course, record))
}

#[instrument(skip_all)]
pub async fn record_lecture_viewed(
    pool: &Pool,
    caller: Option<&str>,
    course_id: &str,
    lecture_id: &str,
) -> CoreResult<ProgressView> {
    let course_id = require_id("course_id", course_id)?;
    let lecture_id = require_id("lecture_id", lecture_id)?;
    let user_id = require_enrollment(pool, caller, course_id).await?;
    let course = load_course(pool, &user_id, course_id).await?;
    if !course.has_lecture(lecture_id) {
        return Err(CoreError::InvalidRequest(format!(
            "lecture {} is not part of course {}",
            lecture_id, course_id
        )));
    }

    let record = db::record_lecture_viewed(pool, &user_id, course_id, lecture_id)
        .await
        .map_err(storage("record_lecture_viewed", &user_id, course_id))?;
    info!(
        user_id = %user_id,
        course_id,
        lecture_id,
        completed = record.completed,
        "lecture viewed"
    );
    Ok(ProgressView::new(course, Some(record)))
}

#[instrument(skip_all)]
pub async fn mark_completed(
    pool: &Pool,
    caller: Option<&str>,
    course_id: &str,
) -> CoreResult<ProgressView> {
    let course_id = require_id("course_id", course_id)?;
    let user_id = require_enrollment(pool, caller, course_id).await?;
    let course = load_course(pool, &user_id, course_id).await?;
    let record = db::mark_completed(pool, &user_id, course_id)
        .await
        .map_err(storage("mark_completed", &user_id, course_id))?;
    info!(user_id = %user_id, course_id, "course marked completed");
    Ok(ProgressView::new(course, Some(record)))
}

#[instrument(skip_all)]
pub async fn mark_incomplete(
    pool: &Pool,
    caller: Option<&str>,
    course_id: &str,
) -> CoreResult<ProgressView> {
    let course_id = require_id("course_id", course_id)?;
    let user_id = require_enrollment(pool, caller, course_id).await?;
    let course = load_course(pool, &user_id, course_id).await?;
    let record = db::mark_incomplete(pool, &user_id, course_id)
        .await
        .map_err(storage("mark_incomplete", &user_id, course_id))?;
    info!(user_id = %user_id, course_id, "course marked incomplete");
    Ok(ProgressView::new(course, Some(record)))
}

/// Certificate issuance is gated on `completed == true`.
#[instrument(skip_all)]
pub async fn certificate_for(
    pool: &Pool,
    caller: Option<&str>,
    course_id: &str,
) -> CoreResult<CertificateRequest> {
    let course_id = require_id("course_id", course_id)?;
    let user_id = require_enrollment(pool, caller, course_id).await?;
    let course = load_course(pool, &user_id, course_id).await?;
    let record = db::get_progress(pool, &user_id, course_id)
        .await
        .map_err(storage("certificate_for", &user_id, course_id))?;

    let completed_at = match record {
        Some(CourseProgress {
            completed: true,
            completed_at: Some(at),
            ..
        }) => at,
        _ => return Err(CoreError::NotCompleted(course_id.to_string())),
    };

    let user_name = db::get_user(pool, &user_id)
        .await
        .map_err(storage("certificate_for", &user_id, course_id))?
        .map(|u| u.name)
        .unwrap_or_else(|| user_id.clone());

    Ok(CertificateRequest {
        user_name,
        course_title: course.title,
        completed_at,
    })
}
