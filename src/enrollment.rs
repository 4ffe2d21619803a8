//! Enrollment accessors and the purchase/enrollment reconciliation job.

use crate::db::{self, Pool};
use crate::error::{storage, CoreError, CoreResult};
use anyhow::Result;
use tracing::{info, instrument, warn};

pub async fn is_enrolled(pool: &Pool, user_id: &str, course_id: &str) -> CoreResult<bool> {
    db::is_enrolled(pool, user_id, course_id)
        .await
        .map_err(storage("is_enrolled", user_id, course_id))
}

/// Course ids the caller is enrolled in.
pub async fn list_for_caller(pool: &Pool, caller: Option<&str>) -> CoreResult<Vec<String>> {
    let user_id = caller
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(CoreError::Unauthenticated)?;
    db::list_enrollments(pool, user_id)
        .await
        .map_err(storage("list_enrollments", user_id, ""))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub repaired: usize,
    pub unbacked: usize,
}

/// Restore enrollments for completed purchases that lack one, and report
/// enrollments with no completed purchase behind them. Unbacked enrollments
/// are only logged; removing entitlement is left to an operator.
#[instrument(skip_all)]
pub async fn reconcile(pool: &Pool) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for gap in db::completed_purchases_missing_enrollment(pool).await? {
        if db::repair_enrollment(pool, &gap).await? {
            info!(user_id = %gap.user_id, course_id = %gap.course_id, "enrollment repaired");
            report.repaired += 1;
        }
    }

    for gap in db::enrollments_without_purchase(pool).await? {
        warn!(
            user_id = %gap.user_id,
            course_id = %gap.course_id,
            "enrollment has no completed purchase"
        );
        report.unbacked += 1;
    }

    Ok(report)
}
