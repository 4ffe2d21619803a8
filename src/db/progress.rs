//! Course progress persistence.
//!
//! Every mutation here runs in one transaction whose first statement writes the
//! `(user_id, course_id)` row. SQLite grants the write lock at that point, so the
//! lecture upsert and the completion recompute that follow see no concurrent
//! writer, and two requests touching the same record serialise instead of
//! losing an update.

use super::catalog::course_lecture_ids_tx;
use super::repo::{enqueue_outbox_tx, Pool};
use crate::model::{covers_all_lectures, CourseProgress, LectureProgress, OutboxKind};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{Row, Sqlite, SqliteConnection, Transaction};
use std::collections::HashSet;
use tracing::{debug, instrument};

async fn ensure_record_tx(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    course_id: &str,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO course_progress (user_id, course_id, completed, created_at, updated_at) \
         VALUES (?, ?, 0, ?, ?) \
         ON CONFLICT(user_id, course_id) DO UPDATE SET updated_at = excluded.updated_at",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn set_completed_tx(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    course_id: &str,
    completed: bool,
) -> Result<()> {
    // completed_at keeps the first completion time until completion is lost.
    sqlx::query(
        "UPDATE course_progress SET completed = ?, \
         completed_at = CASE WHEN ? THEN COALESCE(completed_at, ?) ELSE NULL END \
         WHERE user_id = ? AND course_id = ?",
    )
    .bind(completed)
    .bind(completed)
    .bind(Utc::now())
    .bind(user_id)
    .bind(course_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn load_record(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
) -> Result<Option<CourseProgress>> {
    let row = sqlx::query(
        "SELECT completed, completed_at FROM course_progress WHERE user_id = ? AND course_id = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(&mut *conn)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let completed_at: Option<DateTime<Utc>> = row.get("completed_at");

    // rowid order is first-touched order; upserts keep the original rowid.
    let entries = sqlx::query(
        "SELECT lecture_id, viewed FROM lecture_progress \
         WHERE user_id = ? AND course_id = ? ORDER BY rowid ASC",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(CourseProgress {
        user_id: user_id.to_string(),
        course_id: course_id.to_string(),
        lecture_progress: entries
            .into_iter()
            .map(|r| LectureProgress {
                lecture_id: r.get("lecture_id"),
                viewed: r.get::<i64, _>("viewed") != 0,
            })
            .collect(),
        completed: row.get::<i64, _>("completed") != 0,
        completed_at,
    }))
}

async fn load_record_tx(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    course_id: &str,
) -> Result<CourseProgress> {
    load_record(&mut **tx, user_id, course_id)
        .await?
        .ok_or_else(|| anyhow!("progress {}/{} vanished mid-transaction", user_id, course_id))
}

async fn finish_tx(
    mut tx: Transaction<'_, Sqlite>,
    user_id: &str,
    course_id: &str,
    change: &str,
) -> Result<CourseProgress> {
    let record = load_record_tx(&mut tx, user_id, course_id).await?;
    enqueue_outbox_tx(
        &mut tx,
        OutboxKind::ProgressUpdated,
        course_id,
        &json!({
            "type": OutboxKind::ProgressUpdated.as_str(),
            "course_id": course_id,
            "user_id": user_id,
            "change": change,
            "completed": record.completed,
        }),
    )
    .await?;
    tx.commit().await?;
    Ok(record)
}

#[instrument(skip_all)]
pub async fn get_progress(
    pool: &Pool,
    user_id: &str,
    course_id: &str,
) -> Result<Option<CourseProgress>> {
    let mut conn = pool.acquire().await?;
    load_record(&mut conn, user_id, course_id).await
}

/// Mark one lecture viewed and recompute completion against the course's
/// lecture set as it stands inside this transaction. Progress entries for
/// lectures no longer in the course are pruned first.
#[instrument(skip_all)]
pub async fn record_lecture_viewed(
    pool: &Pool,
    user_id: &str,
    course_id: &str,
    lecture_id: &str,
) -> Result<CourseProgress> {
    let mut tx = pool.begin().await?;
    ensure_record_tx(&mut tx, user_id, course_id).await?;

    sqlx::query(
        "INSERT INTO lecture_progress (user_id, course_id, lecture_id, viewed) VALUES (?, ?, ?, 1) \
         ON CONFLICT(user_id, course_id, lecture_id) DO UPDATE SET viewed = 1",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(lecture_id)
    .execute(&mut *tx)
    .await?;

    let pruned = sqlx::query(
        "DELETE FROM lecture_progress WHERE user_id = ? AND course_id = ? \
         AND lecture_id NOT IN (SELECT lecture_id FROM course_lectures WHERE course_id = ?)",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(course_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if pruned > 0 {
        debug!(user_id, course_id, pruned, "pruned progress for removed lectures");
    }

    let lecture_ids = course_lecture_ids_tx(&mut tx, course_id).await?;
    let viewed_ids: Vec<String> = sqlx::query_scalar(
        "SELECT lecture_id FROM lecture_progress WHERE user_id = ? AND course_id = ? AND viewed = 1",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_all(&mut *tx)
    .await?;
    let viewed: HashSet<String> = viewed_ids.into_iter().collect();

    let completed = covers_all_lectures(&lecture_ids, &viewed);
    set_completed_tx(&mut tx, user_id, course_id, completed).await?;
    finish_tx(tx, user_id, course_id, "lecture_viewed").await
}

/// Explicit override: every current lecture and every existing entry becomes
/// viewed, and the record is completed regardless of coverage.
#[instrument(skip_all)]
pub async fn mark_completed(pool: &Pool, user_id: &str, course_id: &str) -> Result<CourseProgress> {
    let mut tx = pool.begin().await?;
    ensure_record_tx(&mut tx, user_id, course_id).await?;
    sqlx::query(
        "INSERT INTO lecture_progress (user_id, course_id, lecture_id, viewed) \
         SELECT ?, ?, lecture_id, 1 FROM course_lectures WHERE course_id = ? ORDER BY position \
         ON CONFLICT(user_id, course_id, lecture_id) DO UPDATE SET viewed = 1",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(course_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE lecture_progress SET viewed = 1 WHERE user_id = ? AND course_id = ?")
        .bind(user_id)
        .bind(course_id)
        .execute(&mut *tx)
        .await?;
    set_completed_tx(&mut tx, user_id, course_id, true).await?;
    finish_tx(tx, user_id, course_id, "marked_completed").await
}

/// Explicit override: every entry becomes unviewed and the record incomplete.
#[instrument(skip_all)]
pub async fn mark_incomplete(pool: &Pool, user_id: &str, course_id: &str) -> Result<CourseProgress> {
    let mut tx = pool.begin().await?;
    ensure_record_tx(&mut tx, user_id, course_id).await?;
    sqlx::query("UPDATE lecture_progress SET viewed = 0 WHERE user_id = ? AND course_id = ?")
        .bind(user_id)
        .bind(course_id)
        .execute(&mut *tx)
        .await?;
    set_completed_tx(&mut tx, user_id, course_id, false).await?;
    finish_tx(tx, user_id, course_id, "marked_incomplete").await
}
