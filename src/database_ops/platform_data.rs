use anyhow::Result;
use serde_json::Value;
use sqlx::Row;
use tracing::instrument;

use crate::database_ops::db::Db;
use crate::mapping::PlatformType;

/// Entity kinds that carry per-platform sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Product,
    Order,
    Category,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Product => "product",
            EntityType::Order => "order",
            EntityType::Category => "category",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlatformDataPatch {
    pub status: Option<String>,
    pub platform_sku: Option<String>,
    pub platform_price_minor: Option<i64>,
    pub platform_quantity: Option<i64>,
    pub data: Option<Value>,
}

/// Upsert the `(entity_type, entity_id, platform_type)` sync-state row.
/// Unset patch fields keep their stored values; `last_synced_at` always
/// advances — this function is only called after touching the platform.
#[instrument(skip(db, patch))]
pub async fn upsert_platform_data(
    db: &Db,
    user_id: i64,
    entity_type: EntityType,
    entity_id: i64,
    platform: PlatformType,
    patch: &PlatformDataPatch,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO platform_data (user_id, entity_type, entity_id, platform_type, status,
                platform_sku, platform_price_minor, platform_quantity, data, last_synced_at)
         VALUES ($1,$2,$3,$4,COALESCE($5,'pending'),$6,$7,$8,COALESCE($9,'{}'::jsonb),now())
         ON CONFLICT (entity_type, entity_id, platform_type)
         DO UPDATE SET status = COALESCE(EXCLUDED.status, platform_data.status),
                       platform_sku = COALESCE(EXCLUDED.platform_sku, platform_data.platform_sku),
                       platform_price_minor = COALESCE(EXCLUDED.platform_price_minor, platform_data.platform_price_minor),
                       platform_quantity = COALESCE(EXCLUDED.platform_quantity, platform_data.platform_quantity),
                       data = platform_data.data || EXCLUDED.data,
                       last_synced_at = now(),
                       updated_at = now()
         RETURNING id",
    )
    .persistent(false)
    .bind(user_id)
    .bind(entity_type.as_str())
    .bind(entity_id)
    .bind(platform.as_str())
    .bind(&patch.status)
    .bind(&patch.platform_sku)
    .bind(patch.platform_price_minor)
    .bind(patch.platform_quantity)
    .bind(&patch.data)
    .fetch_one(&db.pool)
    .await?;
    Ok(rec.get("id"))
}

#[instrument(skip(db))]
pub async fn get_platform_price_minor(
    db: &Db,
    entity_type: EntityType,
    entity_id: i64,
    platform: PlatformType,
) -> Result<Option<i64>> {
    let rec = sqlx::query(
        "SELECT platform_price_minor FROM platform_data
         WHERE entity_type=$1 AND entity_id=$2 AND platform_type=$3",
    )
    .persistent(false)
    .bind(entity_type.as_str())
    .bind(entity_id)
    .bind(platform.as_str())
    .fetch_optional(&db.pool)
    .await?;
    Ok(rec.and_then(|r| r.try_get("platform_price_minor").ok()))
}
