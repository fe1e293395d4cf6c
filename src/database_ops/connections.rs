use anyhow::Result;
use serde_json::Value;
use sqlx::Row;
use std::str::FromStr;
use tracing::instrument;

use crate::database_ops::db::Db;
use crate::mapping::PlatformType;

/// A user's credentials/configuration for one marketplace integration.
/// `credentials` stays opaque JSON; each platform client knows its own keys.
#[derive(Debug, Clone)]
pub struct PlatformConnection {
    pub id: i64,
    pub user_id: i64,
    pub platform: PlatformType,
    pub name: String,
    pub credentials: Value,
    pub is_active: bool,
}

fn row_to_connection(row: &sqlx::postgres::PgRow) -> Result<PlatformConnection> {
    let platform_raw: String = row.get("platform_type");
    let platform = PlatformType::from_str(&platform_raw)
        .map_err(|e| anyhow::anyhow!("connection {}: {e}", row.get::<i64, _>("id")))?;
    Ok(PlatformConnection {
        id: row.get("id"),
        user_id: row.get("user_id"),
        platform,
        name: row.get("name"),
        credentials: row.get("credentials"),
        is_active: row.get("is_active"),
    })
}

#[instrument(skip(db))]
pub async fn get_connection(db: &Db, connection_id: i64) -> Result<Option<PlatformConnection>> {
    let row = sqlx::query(
        "SELECT id, user_id, platform_type, name, credentials, is_active
         FROM platform_connections WHERE id=$1",
    )
    .persistent(false)
    .bind(connection_id)
    .fetch_optional(&db.pool)
    .await?;
    row.as_ref().map(row_to_connection).transpose()
}

/// Active connections, optionally narrowed to one user. Rows with a platform
/// label this build doesn't know are skipped rather than failing the caller.
#[instrument(skip(db))]
pub async fn list_active_connections(
    db: &Db,
    user_id: Option<i64>,
) -> Result<Vec<PlatformConnection>> {
    let rows = match user_id {
        Some(uid) => {
            sqlx::query(
                "SELECT id, user_id, platform_type, name, credentials, is_active
                 FROM platform_connections WHERE is_active AND user_id=$1 ORDER BY id",
            )
            .persistent(false)
            .bind(uid)
            .fetch_all(&db.pool)
            .await?
        }
        None => {
            sqlx::query(
                "SELECT id, user_id, platform_type, name, credentials, is_active
                 FROM platform_connections WHERE is_active ORDER BY id",
            )
            .persistent(false)
            .fetch_all(&db.pool)
            .await?
        }
    };

    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        match row_to_connection(row) {
            Ok(conn) => out.push(conn),
            Err(e) => tracing::warn!(error = %e, "skipping connection with unknown platform"),
        }
    }
    Ok(out)
}

/// Idempotent insert used by setup tooling and tests.
#[instrument(skip(db, credentials))]
pub async fn ensure_connection(
    db: &Db,
    user_id: i64,
    platform: PlatformType,
    name: &str,
    credentials: &Value,
) -> Result<i64> {
    if let Some(rec) = sqlx::query(
        "SELECT id FROM platform_connections WHERE user_id=$1 AND platform_type=$2 AND name=$3",
    )
    .persistent(false)
    .bind(user_id)
    .bind(platform.as_str())
    .bind(name)
    .fetch_optional(&db.pool)
    .await?
    {
        return Ok(rec.get("id"));
    }
    let rec = sqlx::query(
        "INSERT INTO platform_connections (user_id, platform_type, name, credentials)
         VALUES ($1,$2,$3,$4) RETURNING id",
    )
    .persistent(false)
    .bind(user_id)
    .bind(platform.as_str())
    .bind(name)
    .bind(credentials)
    .fetch_one(&db.pool)
    .await?;
    Ok(rec.get("id"))
}
