use anyhow::Result;
use chrono::NaiveDate;
use itertools::Itertools;
use serde_json::Value;
use sha1::{Digest, Sha1};
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::database_ops::db::Db;
use crate::database_ops::products::match_product;
use crate::mapping::fields::amount_to_minor;
use crate::mapping::{Address, CanonicalOrder};
use crate::normalization::address::{consolidation_key, is_groupable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Inserted,
    Updated,
    Skipped,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct UpsertOutcome {
    pub action: UpsertAction,
    pub id: i64,
}

/// Checksum over the serialized raw payload. Used to break equal-timestamp
/// ties: same `last_modified` with a different body still updates.
pub fn payload_checksum(raw: &Value) -> String {
    let mut hasher = Sha1::new();
    hasher.update(raw.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Insert-or-update one canonical order against `(connection_id,
/// external_order_id)`. Stale or identical redeliveries are skipped, which is
/// what makes re-running a sync window safe.
///
/// The order row and its lines are written in one transaction; line product
/// links are resolved before the transaction opens so the write path holds
/// the row lock as briefly as possible.
#[instrument(skip(db, order), fields(external_id = %order.external_order_id))]
pub async fn upsert_order(
    db: &Db,
    user_id: i64,
    connection_id: i64,
    order: &CanonicalOrder,
) -> Result<UpsertOutcome> {
    let checksum = payload_checksum(&order.raw);

    // Resolve product links outside the transaction (read-only lookups).
    let mut product_ids: Vec<Option<i64>> = Vec::with_capacity(order.lines.len());
    for line in &order.lines {
        let resolved = match line.product_id {
            Some(id) => Some(id),
            None => {
                match_product(db, user_id, line.barcode.as_deref(), line.sku.as_deref()).await?
            }
        };
        product_ids.push(resolved);
    }

    let mut tx = db.pool.begin().await?;

    let existing = sqlx::query(
        "SELECT id, last_modified, raw_checksum FROM orders
         WHERE connection_id=$1 AND external_order_id=$2 FOR UPDATE",
    )
    .persistent(false)
    .bind(connection_id)
    .bind(&order.external_order_id)
    .fetch_optional(&mut *tx)
    .await?;

    let outcome = match existing {
        None => {
            let rec = sqlx::query(
                "INSERT INTO orders (user_id, connection_id, platform_type, external_order_id,
                        order_number, order_status, customer_full_name, customer_email,
                        customer_tc_id, billing_address, shipping_address, cargo_tracking_number,
                        total_minor, total_discount_minor, currency, order_date, last_modified,
                        last_synced_at, raw_checksum, raw_data)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,now(),$18,$19)
                 RETURNING id",
            )
            .persistent(false)
            .bind(user_id)
            .bind(connection_id)
            .bind(order.platform.as_str())
            .bind(&order.external_order_id)
            .bind(&order.order_number)
            .bind(order.status.as_str())
            .bind(&order.customer.full_name)
            .bind(&order.customer.email)
            .bind(&order.customer.tc_id)
            .bind(address_json(&order.billing_address))
            .bind(address_json(&order.shipping_address))
            .bind(&order.cargo_tracking_number)
            .bind(amount_to_minor(order.total_amount))
            .bind(amount_to_minor(order.total_discount_amount))
            .bind(&order.currency)
            .bind(order.order_date)
            .bind(order.last_modified)
            .bind(&checksum)
            .bind(&order.raw)
            .fetch_one(&mut *tx)
            .await?;
            let id: i64 = rec.get("id");
            write_lines(&mut tx, id, order, &product_ids).await?;
            UpsertOutcome {
                action: UpsertAction::Inserted,
                id,
            }
        }
        Some(row) => {
            let id: i64 = row.get("id");
            let stored_modified: Option<chrono::DateTime<chrono::Utc>> =
                row.try_get("last_modified").ok().flatten();
            let stored_checksum: Option<String> = row.try_get("raw_checksum").ok().flatten();

            if !should_apply(order.last_modified, stored_modified, &checksum, stored_checksum.as_deref()) {
                debug!(id, "stale or identical redelivery; skipping");
                tx.rollback().await?;
                return Ok(UpsertOutcome {
                    action: UpsertAction::Skipped,
                    id,
                });
            }

            sqlx::query(
                "UPDATE orders SET order_number=$1, order_status=$2, customer_full_name=$3,
                        customer_email=$4, customer_tc_id=$5, billing_address=$6,
                        shipping_address=$7, cargo_tracking_number=$8, total_minor=$9,
                        total_discount_minor=$10, currency=$11, order_date=$12,
                        last_modified=$13, last_synced_at=now(), raw_checksum=$14,
                        raw_data=$15, updated_at=now()
                 WHERE id=$16",
            )
            .persistent(false)
            .bind(&order.order_number)
            .bind(order.status.as_str())
            .bind(&order.customer.full_name)
            .bind(&order.customer.email)
            .bind(&order.customer.tc_id)
            .bind(address_json(&order.billing_address))
            .bind(address_json(&order.shipping_address))
            .bind(&order.cargo_tracking_number)
            .bind(amount_to_minor(order.total_amount))
            .bind(amount_to_minor(order.total_discount_amount))
            .bind(&order.currency)
            .bind(order.order_date)
            .bind(order.last_modified)
            .bind(&checksum)
            .bind(&order.raw)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            // Replace lines wholesale; marketplaces re-send the full set.
            sqlx::query("DELETE FROM order_items WHERE order_id=$1")
                .persistent(false)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            write_lines(&mut tx, id, order, &product_ids).await?;
            UpsertOutcome {
                action: UpsertAction::Updated,
                id,
            }
        }
    };

    tx.commit().await?;
    Ok(outcome)
}

/// Newer-wins guard. Equal timestamps apply only when the payload body
/// changed; missing incoming timestamps never overwrite a dated row.
fn should_apply(
    incoming: Option<chrono::DateTime<chrono::Utc>>,
    stored: Option<chrono::DateTime<chrono::Utc>>,
    incoming_checksum: &str,
    stored_checksum: Option<&str>,
) -> bool {
    match (incoming, stored) {
        (Some(new), Some(old)) => {
            new > old || (new == old && stored_checksum != Some(incoming_checksum))
        }
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => stored_checksum != Some(incoming_checksum),
    }
}

fn address_json(addr: &Address) -> Option<Value> {
    if addr.is_empty() {
        None
    } else {
        serde_json::to_value(addr).ok()
    }
}

async fn write_lines(
    tx: &mut Transaction<'_, Postgres>,
    order_id: i64,
    order: &CanonicalOrder,
    product_ids: &[Option<i64>],
) -> Result<()> {
    for (line, product_id) in order.lines.iter().zip(product_ids) {
        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, external_line_id, title, quantity,
                    price_minor, discount_minor, commission_rate, vat_rate, barcode, sku)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)",
        )
        .persistent(false)
        .bind(order_id)
        .bind(product_id)
        .bind(&line.external_line_id)
        .bind(&line.title)
        .bind(line.quantity)
        .bind(amount_to_minor(line.price))
        .bind(amount_to_minor(line.discount))
        .bind(line.commission_rate)
        .bind(line.vat_rate)
        .bind(&line.barcode)
        .bind(&line.sku)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Group a user's orders for one civil day by exact shipping-address key and
/// stamp each group of two or more with a fresh `consolidated_group_id`.
/// Opt-in and the day cutoff are the caller's policy; orders already grouped
/// keep their group.
#[instrument(skip(db))]
pub async fn assign_consolidation_groups(db: &Db, user_id: i64, day: NaiveDate) -> Result<u64> {
    let day_start = day.and_time(chrono::NaiveTime::MIN).and_utc();
    let day_end = day_start + chrono::Duration::days(1);

    let rows = sqlx::query(
        "SELECT id, shipping_address FROM orders
         WHERE user_id=$1 AND consolidated_group_id IS NULL
           AND order_date >= $2 AND order_date < $3
           AND shipping_address IS NOT NULL
         ORDER BY id",
    )
    .persistent(false)
    .bind(user_id)
    .bind(day_start)
    .bind(day_end)
    .fetch_all(&db.pool)
    .await?;

    let mut keyed: Vec<(String, i64)> = Vec::new();
    for row in &rows {
        let id: i64 = row.get("id");
        let addr_value: Value = row.get("shipping_address");
        let Ok(addr) = serde_json::from_value::<Address>(addr_value) else {
            continue;
        };
        if is_groupable(&addr) {
            keyed.push((consolidation_key(&addr), id));
        }
    }

    let mut grouped = 0u64;
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    for (_, members) in &keyed.iter().chunk_by(|(key, _)| key.clone()) {
        let ids: Vec<i64> = members.map(|(_, id)| *id).collect();
        if ids.len() < 2 {
            continue;
        }
        let group_id = Uuid::new_v4();
        sqlx::query("UPDATE orders SET consolidated_group_id=$1, updated_at=now() WHERE id = ANY($2)")
            .persistent(false)
            .bind(group_id)
            .bind(&ids)
            .execute(&db.pool)
            .await?;
        grouped += ids.len() as u64;
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn newer_timestamp_applies() {
        let old = Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2024, 7, 1, 11, 0, 0).unwrap();
        assert!(should_apply(Some(new), Some(old), "abc", Some("abc")));
        assert!(!should_apply(Some(old), Some(new), "abc", Some("def")));
    }

    #[test]
    fn equal_timestamp_needs_changed_body() {
        let ts = Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap();
        assert!(!should_apply(Some(ts), Some(ts), "abc", Some("abc")));
        assert!(should_apply(Some(ts), Some(ts), "abc", Some("def")));
    }

    #[test]
    fn missing_incoming_timestamp_never_overwrites_dated_row() {
        let ts = Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap();
        assert!(!should_apply(None, Some(ts), "abc", Some("def")));
    }

    #[test]
    fn undated_rows_compare_by_checksum() {
        assert!(!should_apply(None, None, "abc", Some("abc")));
        assert!(should_apply(None, None, "abc", Some("def")));
        assert!(should_apply(None, None, "abc", None));
    }

    #[test]
    fn checksum_is_stable_per_payload() {
        let a = serde_json::json!({"id": 1, "x": [1, 2, 3]});
        assert_eq!(payload_checksum(&a), payload_checksum(&a.clone()));
        let b = serde_json::json!({"id": 1, "x": [1, 2, 4]});
        assert_ne!(payload_checksum(&a), payload_checksum(&b));
    }
}
