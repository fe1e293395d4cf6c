use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::Row;
use tracing::instrument;

use crate::database_ops::db::Db;

/// Channel the worker LISTENs on for wake-ups; enqueue NOTIFYs it.
pub const JOB_CHANNEL: &str = "sync_jobs";

/// One queued unit of work. `kind` selects the handler (order_sync,
/// product_import, price_update, consolidation); `payload` carries its
/// arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct PoppedJob {
    pub msg_id: i64,
    pub read_ct: i32,
    pub job: SyncJob,
}

/// Pop the oldest ready job. The row stays queued with its visibility
/// timeout pushed into the future; a worker crash just lets it reappear.
/// SKIP LOCKED keeps concurrent workers off the same row.
#[instrument(skip(db))]
pub async fn pop_job(db: &Db, visibility_timeout_secs: i64) -> Result<Option<PoppedJob>> {
    let row = sqlx::query(
        "UPDATE sync_jobs SET read_ct = read_ct + 1,
                vt = now() + make_interval(secs => $1),
                updated_at = now()
         WHERE msg_id = (
             SELECT msg_id FROM sync_jobs
             WHERE status='queued' AND vt <= now() AND scheduled_at <= now()
             ORDER BY msg_id
             FOR UPDATE SKIP LOCKED
             LIMIT 1
         )
         RETURNING msg_id, read_ct, kind, payload",
    )
    .persistent(false)
    .bind(visibility_timeout_secs as f64)
    .fetch_optional(&db.pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(PoppedJob {
        msg_id: row.get("msg_id"),
        read_ct: row.get("read_ct"),
        job: SyncJob {
            kind: row.get("kind"),
            payload: row.get("payload"),
        },
    }))
}

/// Ack: the job ran to completion, drop the row.
#[instrument(skip(db))]
pub async fn delete_job(db: &Db, msg_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM sync_jobs WHERE msg_id=$1")
        .persistent(false)
        .bind(msg_id)
        .execute(&db.pool)
        .await?;
    Ok(())
}

/// Push a failed job's visibility timeout for a retry after `delay_secs`.
#[instrument(skip(db))]
pub async fn delay_job(db: &Db, msg_id: i64, delay_secs: u64) -> Result<()> {
    sqlx::query(
        "UPDATE sync_jobs SET vt = now() + make_interval(secs => $1), updated_at=now()
         WHERE msg_id=$2",
    )
    .persistent(false)
    .bind(delay_secs as f64)
    .bind(msg_id)
    .execute(&db.pool)
    .await?;
    Ok(())
}

/// Retries exhausted: move the payload to the archive table for post-mortems.
#[instrument(skip(db))]
pub async fn archive_job(db: &Db, msg_id: i64, last_error: Option<&str>) -> Result<()> {
    sqlx::query(
        "WITH moved AS (DELETE FROM sync_jobs WHERE msg_id=$1
                        RETURNING msg_id, kind, payload, read_ct)
         INSERT INTO sync_jobs_archive (msg_id, kind, payload, read_ct, last_error)
         SELECT msg_id, kind, payload, read_ct, $2 FROM moved",
    )
    .persistent(false)
    .bind(msg_id)
    .bind(last_error)
    .execute(&db.pool)
    .await?;
    Ok(())
}

/// Enqueue with dedupe: re-enqueueing the same key refreshes the payload and
/// re-arms the row instead of stacking duplicates. NOTIFY wakes any idle
/// worker immediately.
#[instrument(skip(db, payload))]
pub async fn enqueue_job(db: &Db, kind: &str, dedupe_key: &str, payload: &Value) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO sync_jobs (kind, dedupe_key, payload)
         VALUES ($1,$2,$3)
         ON CONFLICT (dedupe_key) DO UPDATE
            SET payload=EXCLUDED.payload, status='queued', vt=now(),
                scheduled_at=now(), updated_at=now()
         RETURNING msg_id",
    )
    .persistent(false)
    .bind(kind)
    .bind(dedupe_key)
    .bind(payload)
    .fetch_one(&db.pool)
    .await?;
    let msg_id: i64 = rec.get("msg_id");

    sqlx::query("SELECT pg_notify($1, $2)")
        .persistent(false)
        .bind(JOB_CHANNEL)
        .bind(msg_id.to_string())
        .execute(&db.pool)
        .await?;
    Ok(msg_id)
}

/// Queue depth for diagnostics.
#[instrument(skip(db))]
pub async fn queued_count(db: &Db) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT count(*) FROM sync_jobs WHERE status='queued'")
        .persistent(false)
        .fetch_one(&db.pool)
        .await?;
    Ok(n)
}
