use crate::model::{OutboxKind, OutboxTask, Role, User};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, Transaction};
use sqlx::{Sqlite, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

pub type Pool = SqlitePool;

/// How long a writer waits for the SQLite write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    // WAL, full durability and a busy timeout on every pooled connection.
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url {}", normalized))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn upsert_user(pool: &Pool, id: &str, name: &str, role: Role) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (id, name, role, created_at) VALUES (?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, role = excluded.role",
    )
    .bind(id)
    .bind(name)
    .bind(role.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("failed to upsert user")?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_user(pool: &Pool, id: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, name, role, created_at FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let role_str: String = row.get("role");
    let role = Role::parse_role(&role_str)
        .ok_or_else(|| anyhow!("user {} has unknown role {}", id, role_str))?;
    Ok(Some(User {
        id: row.get("id"),
        name: row.get("name"),
        role,
        created_at: row.get("created_at"),
    }))
}

/// Queue a change event inside the caller's transaction so it commits or
/// rolls back together with the change it describes.
pub(crate) async fn enqueue_outbox_tx(
    tx: &mut Transaction<'_, Sqlite>,
    kind: OutboxKind,
    course_id: &str,
    payload: &serde_json::Value,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO outbox (kind, course_id, payload, attempt, due_at) VALUES (?, ?, ?, 0, ?) RETURNING id",
    )
    .bind(kind.as_str())
    .bind(course_id)
    .bind(payload.to_string())
    .bind(Utc::now())
    .fetch_one(&mut **tx)
    .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn next_due_outbox(pool: &Pool) -> Result<Option<OutboxTask>> {
    let row = sqlx::query(
        "SELECT id, kind, course_id, payload, attempt FROM outbox \
         WHERE datetime(due_at) <= CURRENT_TIMESTAMP ORDER BY datetime(due_at) ASC, id ASC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let id: i64 = row.get("id");
    let kind_str: String = row.get("kind");
    let kind = OutboxKind::parse_kind(&kind_str)
        .ok_or_else(|| anyhow!("outbox task {} has unknown kind {}", id, kind_str))?;
    let payload: String = row.get("payload");
    let payload = serde_json::from_str(&payload)
        .with_context(|| format!("outbox task {} has malformed payload", id))?;
    Ok(Some(OutboxTask {
        id,
        kind,
        course_id: row.get("course_id"),
        payload,
        attempt: row.get("attempt"),
    }))
}

#[instrument(skip_all)]
pub async fn delete_outbox(pool: &Pool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM outbox WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Exponential backoff: 5s * 2^attempt, capped at `max_cap_secs` (no cap when <= 0).
pub fn backoff_secs(attempt: i32, max_cap_secs: i64) -> i64 {
    let secs = 5_i64 * (1_i64 << attempt.clamp(0, 10));
    if max_cap_secs <= 0 {
        secs
    } else {
        secs.min(max_cap_secs)
    }
}

#[instrument(skip_all)]
pub async fn backoff_outbox_with_cap(
    pool: &Pool,
    id: i64,
    attempt: i32,
    max_cap_secs: i64,
) -> Result<()> {
    let due_at: DateTime<Utc> =
        Utc::now() + chrono::Duration::seconds(backoff_secs(attempt, max_cap_secs));
    sqlx::query("UPDATE outbox SET attempt = ?, due_at = ? WHERE id = ?")
        .bind(attempt + 1)
        .bind(due_at)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn count_remaining_outbox_tasks(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[test]
    fn sqlite_url_normalization() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested").join("db.sqlite");
        let url = format!("sqlite://{}?mode=rwc", path.display());
        assert_eq!(prepare_sqlite_url(&url), url);
        assert!(td.path().join("nested").exists());
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_secs(0, 60), 5);
        assert_eq!(backoff_secs(1, 60), 10);
        assert_eq!(backoff_secs(4, 60), 60);
        assert_eq!(backoff_secs(20, 0), 5 * 1024);
    }

    #[tokio::test]
    async fn user_upsert_and_fetch() {
        let pool = setup_pool().await;
        assert!(get_user(&pool, "U1").await.unwrap().is_none());
        upsert_user(&pool, "U1", "Ada", Role::Student).await.unwrap();
        upsert_user(&pool, "U1", "Ada L.", Role::Instructor).await.unwrap();
        let user = get_user(&pool, "U1").await.unwrap().unwrap();
        assert_eq!(user.name, "Ada L.");
        assert_eq!(user.role, Role::Instructor);
    }

    #[tokio::test]
    async fn outbox_enqueue_backoff_delete() {
        let pool = setup_pool().await;
        let mut tx = pool.begin().await.unwrap();
        let id = enqueue_outbox_tx(&mut tx, OutboxKind::CourseUpdated, "C1", &json!({"a": 1}))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let task = next_due_outbox(&pool).await.unwrap().unwrap();
        assert_eq!(task.id, id);
        assert_eq!(task.kind, OutboxKind::CourseUpdated);
        assert_eq!(task.payload["a"], 1);

        backoff_outbox_with_cap(&pool, id, task.attempt, 60).await.unwrap();
        assert!(next_due_outbox(&pool).await.unwrap().is_none());
        assert_eq!(count_remaining_outbox_tasks(&pool).await.unwrap(), 1);

        delete_outbox(&pool, id).await.unwrap();
        assert_eq!(count_remaining_outbox_tasks(&pool).await.unwrap(), 0);
    }
}
