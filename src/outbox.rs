use crate::db::{self, Pool};
use crate::notify::Notifier;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Deliver the next due event. Returns false when nothing was due.
#[instrument(skip_all)]
pub async fn process_next_task(
    pool: &Pool,
    notifier: &dyn Notifier,
    max_backoff_secs: i64,
) -> Result<bool> {
    let Some(task) = db::next_due_outbox(pool).await? else {
        return Ok(false);
    };
    match notifier.notify(&task.course_id, &task.payload).await {
        Ok(()) => {
            db::delete_outbox(pool, task.id).await?;
            info!(id = task.id, kind = task.kind.as_str(), course_id = %task.course_id, "event delivered");
        }
        Err(err) => {
            warn!(
                ?err,
                id = task.id,
                kind = task.kind.as_str(),
                attempt = task.attempt,
                "event delivery failed; backoff"
            );
            db::backoff_outbox_with_cap(pool, task.id, task.attempt, max_backoff_secs).await?;
        }
    }
    Ok(true)
}

/// Single-threaded delivery loop; sleeps `poll` whenever the outbox is idle.
pub async fn run_worker(pool: Pool, notifier: Arc<dyn Notifier>, poll: Duration, max_backoff_secs: i64) {
    loop {
        match process_next_task(&pool, notifier.as_ref(), max_backoff_secs).await {
            Ok(true) => {}
            Ok(false) => tokio::time::sleep(poll).await,
            Err(err) => {
                error!(?err, "outbox worker error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
