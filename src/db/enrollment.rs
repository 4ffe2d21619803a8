use super::model::EnrollmentGap;
use super::repo::{enqueue_outbox_tx, Pool};
use crate::model::OutboxKind;
use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use sqlx::{Row, Sqlite, Transaction};
use tracing::instrument;

#[instrument(skip_all)]
pub async fn is_enrolled(pool: &Pool, user_id: &str, course_id: &str) -> Result<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM enrollments WHERE user_id = ? AND course_id = ?")
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

#[instrument(skip_all)]
pub async fn list_enrollments(pool: &Pool, user_id: &str) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar(
        "SELECT course_id FROM enrollments WHERE user_id = ? ORDER BY enrolled_at ASC, course_id ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

async fn enrollment_added_tx(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    course_id: &str,
) -> Result<()> {
    enqueue_outbox_tx(
        tx,
        OutboxKind::EnrollmentAdded,
        course_id,
        &json!({ "type": OutboxKind::EnrollmentAdded.as_str(), "course_id": course_id, "user_id": user_id }),
    )
    .await?;
    Ok(())
}

/// Idempotent set-add. Returns true when the enrollment is new, in which case an
/// `enrollment_added` event is queued in the same transaction.
pub(crate) async fn add_enrollment_tx(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    course_id: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO enrollments (user_id, course_id, enrolled_at) VALUES (?, ?, ?) \
         ON CONFLICT(user_id, course_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;
    let inserted = result.rows_affected() > 0;
    if inserted {
        enrollment_added_tx(tx, user_id, course_id).await?;
    }
    Ok(inserted)
}

/// Completed purchases whose enrollment row is missing (repairable).
#[instrument(skip_all)]
pub async fn completed_purchases_missing_enrollment(pool: &Pool) -> Result<Vec<EnrollmentGap>> {
    let rows = sqlx::query(
        "SELECT DISTINCT p.user_id, p.course_id FROM purchases p \
         LEFT JOIN enrollments e ON e.user_id = p.user_id AND e.course_id = p.course_id \
         WHERE p.status = 'completed' AND e.user_id IS NULL \
         ORDER BY p.user_id, p.course_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| EnrollmentGap {
            user_id: row.get("user_id"),
            course_id: row.get("course_id"),
        })
        .collect())
}

/// Enrollments with no completed purchase behind them (a defect state).
#[instrument(skip_all)]
pub async fn enrollments_without_purchase(pool: &Pool) -> Result<Vec<EnrollmentGap>> {
    let rows = sqlx::query(
        "SELECT e.user_id, e.course_id FROM enrollments e \
         WHERE NOT EXISTS (SELECT 1 FROM purchases p \
             WHERE p.user_id = e.user_id AND p.course_id = e.course_id AND p.status = 'completed') \
         ORDER BY e.user_id, e.course_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| EnrollmentGap {
            user_id: row.get("user_id"),
            course_id: row.get("course_id"),
        })
        .collect())
}

/// Re-derive the enrollment for one gap. The insert is conditional on a
/// completed purchase and is the transaction's first statement, so it takes the
/// write lock before anything is read. Returns true when a row was added.
#[instrument(skip_all)]
pub async fn repair_enrollment(pool: &Pool, gap: &EnrollmentGap) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "INSERT INTO enrollments (user_id, course_id, enrolled_at) \
         SELECT ?, ?, ? WHERE EXISTS (SELECT 1 FROM purchases \
             WHERE user_id = ? AND course_id = ? AND status = 'completed') \
         ON CONFLICT(user_id, course_id) DO NOTHING",
    )
    .bind(&gap.user_id)
    .bind(&gap.course_id)
    .bind(Utc::now())
    .bind(&gap.user_id)
    .bind(&gap.course_id)
    .execute(&mut *tx)
    .await?;
    let added = result.rows_affected() > 0;
    if added {
        enrollment_added_tx(&mut tx, &gap.user_id, &gap.course_id).await?;
    }
    tx.commit().await?;
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn add_enrollment_is_idempotent() {
        let pool = setup_pool().await;
        let mut tx = pool.begin().await.unwrap();
        assert!(add_enrollment_tx(&mut tx, "U1", "C1").await.unwrap());
        assert!(!add_enrollment_tx(&mut tx, "U1", "C1").await.unwrap());
        tx.commit().await.unwrap();

        assert!(is_enrolled(&pool, "U1", "C1").await.unwrap());
        assert!(!is_enrolled(&pool, "U1", "C2").await.unwrap());
        assert_eq!(list_enrollments(&pool, "U1").await.unwrap(), vec!["C1".to_string()]);

        let events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE kind = 'enrollment_added'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(events, 1);
    }

    #[tokio::test]
    async fn rolled_back_enrollment_leaves_nothing() {
        let pool = setup_pool().await;
        let mut tx = pool.begin().await.unwrap();
        add_enrollment_tx(&mut tx, "U1", "C1").await.unwrap();
        tx.rollback().await.unwrap();
        assert!(!is_enrolled(&pool, "U1", "C1").await.unwrap());
        assert_eq!(count_outbox(&pool).await, 0);
    }

    async fn count_outbox(pool: &Pool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM outbox")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn unbacked_enrollment_is_reported_not_repaired() {
        let pool = setup_pool().await;
        let mut tx = pool.begin().await.unwrap();
        add_enrollment_tx(&mut tx, "U9", "C9").await.unwrap();
        tx.commit().await.unwrap();

        let defects = enrollments_without_purchase(&pool).await.unwrap();
        assert_eq!(
            defects,
            vec![EnrollmentGap {
                user_id: "U9".into(),
                course_id: "C9".into()
            }]
        );
        assert!(!repair_enrollment(&pool, &EnrollmentGap { user_id: "U8".into(), course_id: "C8".into() })
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn repair_adds_backed_enrollment_once() {
        let pool = setup_pool().await;
        sqlx::query(
            "INSERT INTO purchases (id, user_id, course_id, amount, status, order_id, payment_id) \
             VALUES ('P1', 'U1', 'C1', 1499, 'completed', 'o1', 'p1')",
        )
        .execute(&pool)
        .await
        .unwrap();
        let gap = EnrollmentGap {
            user_id: "U1".into(),
            course_id: "C1".into(),
        };

        assert!(repair_enrollment(&pool, &gap).await.unwrap());
        assert!(!repair_enrollment(&pool, &gap).await.unwrap());
        assert!(is_enrolled(&pool, "U1", "C1").await.unwrap());
        assert_eq!(count_outbox(&pool).await, 1);
    }
}
