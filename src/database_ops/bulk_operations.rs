use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

use crate::bulk::{BulkOperationStatus, BulkTracker};
use crate::database_ops::db::Db;

/// Notification channel for front-end push consumers. Payload is the same
/// JSON the polling endpoint serves.
pub const PROGRESS_CHANNEL: &str = "bulk_operation_progress";

/// Persisted mirror of a tracker, as served by the status API.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BulkOperationRow {
    pub id: Uuid,
    pub user_id: i64,
    pub connection_id: Option<i64>,
    pub kind: String,
    pub status: String,
    pub total_items: i64,
    pub processed_items: i64,
    pub successful_items: i64,
    pub failed_items: i64,
    pub progress: f64,
    pub errors: serde_json::Value,
    pub warnings: serde_json::Value,
    pub fatal_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

fn row_to_operation(row: &sqlx::postgres::PgRow) -> BulkOperationRow {
    BulkOperationRow {
        id: row.get("id"),
        user_id: row.get("user_id"),
        connection_id: row.try_get("connection_id").ok(),
        kind: row.get("kind"),
        status: row.get("status"),
        total_items: row.get("total_items"),
        processed_items: row.get("processed_items"),
        successful_items: row.get("successful_items"),
        failed_items: row.get("failed_items"),
        progress: row.get("progress"),
        errors: row.get("errors"),
        warnings: row.get("warnings"),
        fatal_error: row.try_get("fatal_error").ok().flatten(),
        started_at: row.try_get("started_at").ok().flatten(),
        completed_at: row.try_get("completed_at").ok().flatten(),
        processing_time_ms: row.try_get("processing_time_ms").ok().flatten(),
        created_at: row.get("created_at"),
    }
}

#[instrument(skip(db, tracker))]
pub async fn create_operation(
    db: &Db,
    user_id: i64,
    connection_id: Option<i64>,
    tracker: &BulkTracker,
) -> Result<Uuid> {
    let rec = sqlx::query(
        "INSERT INTO bulk_operations (user_id, connection_id, kind, status, total_items)
         VALUES ($1,$2,$3,$4,$5) RETURNING id",
    )
    .persistent(false)
    .bind(user_id)
    .bind(connection_id)
    .bind(tracker.kind.as_str())
    .bind(tracker.status.as_str())
    .bind(tracker.total_items as i64)
    .fetch_one(&db.pool)
    .await?;
    Ok(rec.get("id"))
}

/// Flush tracker state to the row and notify push consumers. Called per
/// chunk, not per item — the row is the coarse progress surface, the tracker
/// holds exact counts in memory.
///
/// A row already cancelled by an external signal keeps its `cancelled`
/// status: the writer loop may race one last flush after the operator hit
/// cancel, and that flush must not resurrect the operation.
#[instrument(skip(db, tracker))]
pub async fn save_progress(db: &Db, id: Uuid, tracker: &BulkTracker) -> Result<()> {
    sqlx::query(
        "UPDATE bulk_operations
         SET status = CASE WHEN status = 'cancelled' THEN status ELSE $1 END,
             total_items=$2, processed_items=$3, successful_items=$4, failed_items=$5,
             progress=$6, errors=$7, warnings=$8, fatal_error=$9,
             started_at=COALESCE(started_at, $10), completed_at=$11,
             processing_time_ms=$12, updated_at=now()
         WHERE id=$13",
    )
    .persistent(false)
    .bind(tracker.status.as_str())
    .bind(tracker.total_items as i64)
    .bind(tracker.processed_items as i64)
    .bind(tracker.successful_items as i64)
    .bind(tracker.failed_items as i64)
    .bind(tracker.progress())
    .bind(serde_json::to_value(&tracker.errors)?)
    .bind(serde_json::to_value(&tracker.warnings)?)
    .bind(&tracker.fatal_error)
    .bind(tracker.started_at)
    .bind(tracker.completed_at)
    .bind(tracker.processing_time_ms)
    .bind(id)
    .execute(&db.pool)
    .await?;

    let payload = json!({
        "id": id,
        "kind": tracker.kind.as_str(),
        "status": tracker.status.as_str(),
        "progress": tracker.progress(),
        "processed_items": tracker.processed_items,
        "total_items": tracker.total_items,
        "failed_items": tracker.failed_items,
    });
    sqlx::query("SELECT pg_notify($1, $2)")
        .persistent(false)
        .bind(PROGRESS_CHANNEL)
        .bind(payload.to_string())
        .execute(&db.pool)
        .await?;
    Ok(())
}

#[instrument(skip(db))]
pub async fn load_operation(db: &Db, id: Uuid) -> Result<Option<BulkOperationRow>> {
    let row = sqlx::query("SELECT * FROM bulk_operations WHERE id=$1")
        .persistent(false)
        .bind(id)
        .fetch_optional(&db.pool)
        .await?;
    Ok(row.as_ref().map(row_to_operation))
}

#[instrument(skip(db))]
pub async fn list_operations(db: &Db, user_id: i64, limit: i64) -> Result<Vec<BulkOperationRow>> {
    let rows = sqlx::query(
        "SELECT * FROM bulk_operations WHERE user_id=$1 ORDER BY created_at DESC LIMIT $2",
    )
    .persistent(false)
    .bind(user_id)
    .bind(limit)
    .fetch_all(&db.pool)
    .await?;
    Ok(rows.iter().map(row_to_operation).collect())
}

/// External cancellation signal (API, operator tooling). The running job
/// polls `is_cancel_requested` between chunks and stops accounting items.
/// Terminal rows are left untouched; returns whether anything changed.
#[instrument(skip(db))]
pub async fn request_cancel(db: &Db, id: Uuid) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE bulk_operations SET status='cancelled', completed_at=now(), updated_at=now()
         WHERE id=$1 AND status IN ('pending','processing')",
    )
    .persistent(false)
    .bind(id)
    .execute(&db.pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip(db))]
pub async fn is_cancel_requested(db: &Db, id: Uuid) -> Result<bool> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM bulk_operations WHERE id=$1")
        .persistent(false)
        .bind(id)
        .fetch_optional(&db.pool)
        .await?;
    Ok(status.as_deref() == Some(BulkOperationStatus::Cancelled.as_str()))
}
