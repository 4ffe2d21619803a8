//! Course catalog operations with ownership checks.

use crate::access::{require_owner, require_role, require_user};
use crate::db::{self, NewCourse, NewLecture, Pool};
use crate::error::{storage, CoreError, CoreResult};
use crate::model::{Course, Lecture, Role};
use serde::Deserialize;
use tracing::{info, instrument};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCourse {
    pub title: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub price: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLecture {
    pub title: Option<String>,
    pub video_url: Option<String>,
    #[serde(default)]
    pub free_preview: bool,
}

fn non_empty(field: &str, value: Option<&str>) -> CoreResult<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CoreError::InvalidRequest(format!("{} is required", field)))
}

pub async fn get_course(pool: &Pool, course_id: &str) -> CoreResult<Course> {
    db::get_course_by_id(pool, course_id)
        .await
        .map_err(storage("get_course", "", course_id))?
        .ok_or_else(|| CoreError::CourseNotFound(course_id.to_string()))
}

pub async fn list_published(pool: &Pool) -> CoreResult<Vec<Course>> {
    db::list_published_courses(pool)
        .await
        .map_err(storage("list_published", "", ""))
}

async fn owned_course(pool: &Pool, caller: Option<&str>, course_id: &str) -> CoreResult<Course> {
    let user = require_user(pool, caller).await?;
    let course = get_course(pool, course_id).await?;
    require_owner(&user, &course)?;
    Ok(course)
}

#[instrument(skip_all)]
pub async fn create_course(
    pool: &Pool,
    caller: Option<&str>,
    req: &CreateCourse,
) -> CoreResult<Course> {
    let user = require_role(pool, caller, &[Role::Instructor, Role::Admin]).await?;
    let title = non_empty("title", req.title.as_deref())?;
    let category = non_empty("category", req.category.as_deref())?;
    if req.price < 0 {
        return Err(CoreError::InvalidRequest("price must not be negative".into()));
    }
    let new = NewCourse {
        id: uuid::Uuid::new_v4().to_string(),
        title,
        category,
        instructor_id: user.id.clone(),
        price: req.price,
    };
    db::create_course(pool, &new)
        .await
        .map_err(storage("create_course", &user.id, &new.id))?;
    info!(course_id = %new.id, instructor = %user.id, "course created");
    get_course(pool, &new.id).await
}

#[instrument(skip_all)]
pub async fn add_lecture(
    pool: &Pool,
    caller: Option<&str>,
    course_id: &str,
    req: &CreateLecture,
) -> CoreResult<Lecture> {
    let course = owned_course(pool, caller, course_id).await?;
    let new = NewLecture {
        id: uuid::Uuid::new_v4().to_string(),
        title: non_empty("title", req.title.as_deref())?,
        video_url: req
            .video_url
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string),
        free_preview: req.free_preview,
    };
    db::add_lecture(pool, &course.id, &new)
        .await
        .map_err(storage("add_lecture", &course.instructor_id, &course.id))?
        .ok_or_else(|| CoreError::CourseNotFound(course.id.clone()))
}

#[instrument(skip_all)]
pub async fn remove_lecture(
    pool: &Pool,
    caller: Option<&str>,
    course_id: &str,
    lecture_id: &str,
) -> CoreResult<Course> {
    let course = owned_course(pool, caller, course_id).await?;
    let removed = db::remove_lecture(pool, &course.id, lecture_id)
        .await
        .map_err(storage("remove_lecture", &course.instructor_id, &course.id))?;
    if !removed {
        return Err(CoreError::InvalidRequest(format!(
            "lecture {} is not part of course {}",
            lecture_id, course.id
        )));
    }
    get_course(pool, &course.id).await
}

#[instrument(skip_all)]
pub async fn set_published(
    pool: &Pool,
    caller: Option<&str>,
    course_id: &str,
    published: bool,
) -> CoreResult<Course> {
    let course = owned_course(pool, caller, course_id).await?;
    let found = db::set_published(pool, &course.id, published)
        .await
        .map_err(storage("set_published", &course.instructor_id, &course.id))?;
    if !found {
        return Err(CoreError::CourseNotFound(course.id));
    }
    get_course(pool, &course.id).await
}
