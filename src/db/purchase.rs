use super::enrollment::add_enrollment_tx;
use super::model::{NewPurchase, PurchaseInsert};
use super::repo::Pool;
use crate::model::{Purchase, PurchaseStatus};
use anyhow::{anyhow, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{info, instrument};

fn purchase_from_row(row: &SqliteRow) -> Result<Purchase> {
    let status_str: String = row.get("status");
    let status = PurchaseStatus::parse_status(&status_str)
        .ok_or_else(|| anyhow!("purchase has unknown status {}", status_str))?;
    Ok(Purchase {
        id: row.get("id"),
        user_id: row.get("user_id"),
        course_id: row.get("course_id"),
        amount: row.get("amount"),
        status,
        order_id: row.get("order_id"),
        payment_id: row.get("payment_id"),
        created_at: row.get("created_at"),
    })
}

/// Record a verified payment and derive the enrollment from it in one
/// transaction. A replay of the same (order_id, payment_id) changes nothing and
/// reports `Duplicate`.
#[instrument(skip_all)]
pub async fn record_completed_purchase(pool: &Pool, new: &NewPurchase) -> Result<PurchaseInsert> {
    let mut tx = pool.begin().await?;
    let purchase = Purchase {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: new.user_id.clone(),
        course_id: new.course_id.clone(),
        amount: new.amount,
        status: PurchaseStatus::Completed,
        order_id: new.order_id.clone(),
        payment_id: new.payment_id.clone(),
        created_at: Utc::now(),
    };
    let inserted = sqlx::query(
        "INSERT INTO purchases (id, user_id, course_id, amount, status, order_id, payment_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) ON CONFLICT(order_id, payment_id) DO NOTHING",
    )
    .bind(&purchase.id)
    .bind(&purchase.user_id)
    .bind(&purchase.course_id)
    .bind(purchase.amount)
    .bind(purchase.status.as_str())
    .bind(&purchase.order_id)
    .bind(&purchase.payment_id)
    .bind(purchase.created_at)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if inserted == 0 {
        tx.rollback().await?;
        return Ok(PurchaseInsert::Duplicate);
    }

    let enrolled = add_enrollment_tx(&mut tx, &purchase.user_id, &purchase.course_id).await?;
    tx.commit().await?;
    info!(
        purchase_id = %purchase.id,
        user_id = %purchase.user_id,
        course_id = %purchase.course_id,
        enrolled,
        "purchase recorded"
    );
    Ok(PurchaseInsert::Recorded(purchase))
}

#[instrument(skip_all)]
pub async fn find_purchase(pool: &Pool, order_id: &str, payment_id: &str) -> Result<Option<Purchase>> {
    let row = sqlx::query(
        "SELECT id, user_id, course_id, amount, status, order_id, payment_id, created_at \
         FROM purchases WHERE order_id = ? AND payment_id = ?",
    )
    .bind(order_id)
    .bind(payment_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(purchase_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn list_purchases_for_user(pool: &Pool, user_id: &str) -> Result<Vec<Purchase>> {
    let rows = sqlx::query(
        "SELECT id, user_id, course_id, amount, status, order_id, payment_id, created_at \
         FROM purchases WHERE user_id = ? ORDER BY created_at ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(purchase_from_row).collect()
}
