use super::model::{NewCourse, NewLecture};
use super::repo::{enqueue_outbox_tx, Pool};
use crate::model::{Course, Lecture, OutboxKind};
use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use tracing::instrument;

const COURSE_COLUMNS: &str =
    "id, title, category, instructor_id, price, published, created_at, updated_at";

fn course_from_row(row: &SqliteRow, lectures: Vec<Lecture>) -> Course {
    Course {
        id: row.get("id"),
        title: row.get("title"),
        category: row.get("category"),
        instructor_id: row.get("instructor_id"),
        price: row.get("price"),
        published: row.get::<i64, _>("published") != 0,
        lectures,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

async fn lectures_for(pool: &Pool, course_id: &str) -> Result<Vec<Lecture>> {
    let rows = sqlx::query(
        "SELECT l.id, l.title, l.video_url, l.free_preview, cl.position \
         FROM course_lectures cl JOIN lectures l ON l.id = cl.lecture_id \
         WHERE cl.course_id = ? ORDER BY cl.position ASC",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| Lecture {
            id: row.get("id"),
            title: row.get("title"),
            video_url: row.get("video_url"),
            free_preview: row.get::<i64, _>("free_preview") != 0,
            position: row.get("position"),
        })
        .collect())
}

/// Lecture ids of a course as seen by the caller's transaction.
pub(crate) async fn course_lecture_ids_tx(
    tx: &mut Transaction<'_, Sqlite>,
    course_id: &str,
) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar(
        "SELECT lecture_id FROM course_lectures WHERE course_id = ? ORDER BY position ASC",
    )
    .bind(course_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(ids)
}

async fn course_exists_tx(tx: &mut Transaction<'_, Sqlite>, course_id: &str) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM courses WHERE id = ?")
        .bind(course_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(found.is_some())
}

async fn touch_course_tx(
    tx: &mut Transaction<'_, Sqlite>,
    course_id: &str,
    change: &str,
) -> Result<()> {
    sqlx::query("UPDATE courses SET updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(course_id)
        .execute(&mut **tx)
        .await?;
    enqueue_outbox_tx(
        tx,
        OutboxKind::CourseUpdated,
        course_id,
        &json!({ "type": OutboxKind::CourseUpdated.as_str(), "course_id": course_id, "change": change }),
    )
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_course_by_id(pool: &Pool, course_id: &str) -> Result<Option<Course>> {
    let sql = format!("SELECT {} FROM courses WHERE id = ?", COURSE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(course_id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let lectures = lectures_for(pool, course_id).await?;
    Ok(Some(course_from_row(&row, lectures)))
}

#[instrument(skip_all)]
pub async fn list_published_courses(pool: &Pool) -> Result<Vec<Course>> {
    let sql = format!(
        "SELECT {} FROM courses WHERE published = 1 ORDER BY created_at ASC, id ASC",
        COURSE_COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    let mut courses = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.get("id");
        let lectures = lectures_for(pool, &id).await?;
        courses.push(course_from_row(&row, lectures));
    }
    Ok(courses)
}

#[instrument(skip_all)]
pub async fn create_course(pool: &Pool, course: &NewCourse) -> Result<()> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO courses (id, title, category, instructor_id, price, published, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 0, ?, ?)",
    )
    .bind(&course.id)
    .bind(&course.title)
    .bind(&course.category)
    .bind(&course.instructor_id)
    .bind(course.price)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("failed to insert course")?;
    touch_course_tx(&mut tx, &course.id, "created").await?;
    tx.commit().await?;
    Ok(())
}

/// Append a lecture to the end of a course. Returns None when the course is gone.
#[instrument(skip_all)]
pub async fn add_lecture(
    pool: &Pool,
    course_id: &str,
    lecture: &NewLecture,
) -> Result<Option<Lecture>> {
    let mut tx = pool.begin().await?;
    if !course_exists_tx(&mut tx, course_id).await? {
        return Ok(None);
    }
    sqlx::query(
        "INSERT INTO lectures (id, title, video_url, free_preview, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&lecture.id)
    .bind(&lecture.title)
    .bind(&lecture.video_url)
    .bind(lecture.free_preview)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await
    .context("failed to insert lecture")?;

    let max_pos: Option<i64> =
        sqlx::query_scalar("SELECT MAX(position) FROM course_lectures WHERE course_id = ?")
            .bind(course_id)
            .fetch_one(&mut *tx)
            .await?;
    let position = max_pos.unwrap_or(0) + 1;
    sqlx::query("INSERT INTO course_lectures (course_id, lecture_id, position) VALUES (?, ?, ?)")
        .bind(course_id)
        .bind(&lecture.id)
        .bind(position)
        .execute(&mut *tx)
        .await?;
    touch_course_tx(&mut tx, course_id, "lecture_added").await?;
    tx.commit().await?;

    Ok(Some(Lecture {
        id: lecture.id.clone(),
        title: lecture.title.clone(),
        video_url: lecture.video_url.clone(),
        free_preview: lecture.free_preview,
        position,
    }))
}

/// Detach a lecture from a course. Returns false when nothing was attached.
#[instrument(skip_all)]
pub async fn remove_lecture(pool: &Pool, course_id: &str, lecture_id: &str) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let removed = sqlx::query("DELETE FROM course_lectures WHERE course_id = ? AND lecture_id = ?")
        .bind(course_id)
        .bind(lecture_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if removed == 0 {
        return Ok(false);
    }
    touch_course_tx(&mut tx, course_id, "lecture_removed").await?;
    tx.commit().await?;
    Ok(true)
}

/// Returns false when the course does not exist.
#[instrument(skip_all)]
pub async fn set_published(pool: &Pool, course_id: &str, published: bool) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let updated = sqlx::query("UPDATE courses SET published = ? WHERE id = ?")
        .bind(published)
        .bind(course_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if updated == 0 {
        return Ok(false);
    }
    let change = if published { "published" } else { "unpublished" };
    touch_course_tx(&mut tx, course_id, change).await?;
    tx.commit().await?;
    Ok(true)
}
