//! CSV-driven bulk operations: catalogue import and price updates. Each run
//! creates a `bulk_operations` row up front and accounts every data row
//! against it; an unreadable source file fails the operation outright
//! without touching per-item counters.

use anyhow::Result;
use csv::ReaderBuilder;
use serde::Deserialize;
use std::io::Read;
use std::str::FromStr;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::bulk::{BulkOperationKind, BulkTracker};
use crate::database_ops::bulk_operations::{create_operation, is_cancel_requested, save_progress};
use crate::database_ops::db::Db;
use crate::database_ops::platform_data::{upsert_platform_data, EntityType, PlatformDataPatch};
use crate::database_ops::products::{match_product, upsert_product};
use crate::mapping::fields::amount_to_minor;
use crate::mapping::{CanonicalProduct, PlatformType};

/// Rows as exported by the back office's product sheet. Header names follow
/// the Turkish sheet template; serde aliases absorb the English variant.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductCsvRow {
    #[serde(alias = "baslik", alias = "urun_adi")]
    pub title: Option<String>,
    #[serde(alias = "barkod")]
    pub barcode: Option<String>,
    #[serde(alias = "stok_kodu", alias = "sku")]
    pub stock_code: Option<String>,
    #[serde(alias = "fiyat", default)]
    pub price: Option<f64>,
    #[serde(alias = "stok", alias = "adet", default)]
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceCsvRow {
    #[serde(alias = "barkod")]
    pub barcode: Option<String>,
    #[serde(alias = "stok_kodu", alias = "sku")]
    pub stock_code: Option<String>,
    #[serde(alias = "platform")]
    pub platform_type: String,
    #[serde(alias = "fiyat")]
    pub price: f64,
}

pub fn parse_products_csv<R: Read>(reader: R) -> Result<Vec<ProductCsvRow>> {
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = Vec::new();
    for rec in rdr.deserialize::<ProductCsvRow>() {
        rows.push(rec?);
    }
    Ok(rows)
}

pub fn parse_prices_csv<R: Read>(reader: R) -> Result<Vec<PriceCsvRow>> {
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = Vec::new();
    for rec in rdr.deserialize::<PriceCsvRow>() {
        rows.push(rec?);
    }
    Ok(rows)
}

const SAVE_EVERY: u64 = 25;

/// Import a product sheet. Returns the bulk operation id; progress and
/// per-row errors land on that row as the import walks the file.
#[instrument(skip(db))]
pub async fn import_products_from_csv(db: &Db, user_id: i64, path: &str) -> Result<Uuid> {
    let mut tracker = BulkTracker::new(BulkOperationKind::ProductImport, 0);
    let op_id = create_operation(db, user_id, None, &tracker).await?;

    let rows = match std::fs::File::open(path).map_err(anyhow::Error::from).and_then(parse_products_csv) {
        Ok(rows) => rows,
        Err(e) => {
            tracker.fail_fatal(format!("source file unreadable: {path}: {e}"));
            save_progress(db, op_id, &tracker).await?;
            return Ok(op_id);
        }
    };

    tracker.total_items = rows.len() as u64;
    tracker.start();
    save_progress(db, op_id, &tracker).await?;

    for (idx, row) in rows.iter().enumerate() {
        if tracker.processed_items % SAVE_EVERY == 0
            && is_cancel_requested(db, op_id).await.unwrap_or(false)
        {
            tracker.cancel();
            break;
        }

        let row_ref = format!("row {}", idx + 2); // 1-based + header line
        if row.barcode.is_none() && row.stock_code.is_none() {
            tracker.record_failure(row_ref, "row has neither barcode nor stock code");
            continue;
        }
        let product = CanonicalProduct {
            // Sheet imports aren't platform-specific; identity comes from the
            // barcode/stock code, platform listings attach later.
            platform: PlatformType::Trendyol,
            external_product_id: row
                .barcode
                .clone()
                .or_else(|| row.stock_code.clone())
                .unwrap_or_default(),
            title: row.title.clone(),
            barcode: row.barcode.clone(),
            stock_code: row.stock_code.clone(),
            price: row.price.unwrap_or(0.0),
            quantity: row.quantity.unwrap_or(0),
            raw: serde_json::json!({"source": "csv", "row": idx + 2}),
        };
        match upsert_product(db, user_id, &product).await {
            Ok(_) => tracker.record_success(),
            Err(e) => {
                warn!(row = idx + 2, error = %e, "product row failed");
                tracker.record_failure(row_ref, format!("{e:#}"));
            }
        }

        if tracker.processed_items % SAVE_EVERY == 0 {
            save_progress(db, op_id, &tracker).await?;
        }
    }

    tracker.finish();
    save_progress(db, op_id, &tracker).await?;
    info!(%op_id, status = %tracker.status, "product import finished");
    Ok(op_id)
}

/// Bulk price update: resolve each row to a product, stamp the new price on
/// the product's platform_data row for the named platform. The outbound push
/// to the marketplace is the platform client's job, driven off the updated
/// sync state.
#[instrument(skip(db))]
pub async fn price_update_from_csv(db: &Db, user_id: i64, path: &str) -> Result<Uuid> {
    let mut tracker = BulkTracker::new(BulkOperationKind::PriceUpdate, 0);
    let op_id = create_operation(db, user_id, None, &tracker).await?;

    let rows = match std::fs::File::open(path).map_err(anyhow::Error::from).and_then(parse_prices_csv) {
        Ok(rows) => rows,
        Err(e) => {
            tracker.fail_fatal(format!("source file unreadable: {path}: {e}"));
            save_progress(db, op_id, &tracker).await?;
            return Ok(op_id);
        }
    };

    tracker.total_items = rows.len() as u64;
    tracker.start();
    save_progress(db, op_id, &tracker).await?;

    for (idx, row) in rows.iter().enumerate() {
        let row_ref = format!("row {}", idx + 2);
        let platform = match PlatformType::from_str(&row.platform_type) {
            Ok(p) => p,
            Err(e) => {
                tracker.record_failure(row_ref, e);
                continue;
            }
        };
        let product_id = match match_product(
            db,
            user_id,
            row.barcode.as_deref(),
            row.stock_code.as_deref(),
        )
        .await
        {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracker.record_failure(row_ref, "no product matches barcode/stock code");
                continue;
            }
            Err(e) => {
                tracker.record_failure(row_ref, format!("{e:#}"));
                continue;
            }
        };

        let patch = PlatformDataPatch {
            status: Some("price_pending".to_string()),
            platform_price_minor: Some(amount_to_minor(row.price)),
            ..PlatformDataPatch::default()
        };
        match upsert_platform_data(db, user_id, EntityType::Product, product_id, platform, &patch)
            .await
        {
            Ok(_) => tracker.record_success(),
            Err(e) => tracker.record_failure(row_ref, format!("{e:#}")),
        }

        if tracker.processed_items % SAVE_EVERY == 0 {
            save_progress(db, op_id, &tracker).await?;
        }
    }

    tracker.finish();
    save_progress(db, op_id, &tracker).await?;
    info!(%op_id, status = %tracker.status, "price update finished");
    Ok(op_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_turkish_product_headers() {
        let csv = "baslik,barkod,stok_kodu,fiyat,stok\n\
                   Termos 750ml,8691234567890,TRM-750,282.33,12\n\
                   Kupa,,KP-01,49.9,3\n";
        let rows = parse_products_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].barcode.as_deref(), Some("8691234567890"));
        assert_eq!(rows[0].price, Some(282.33));
        // csv deserializes the empty field to None for Option types
        assert_eq!(rows[1].barcode, None);
        assert_eq!(rows[1].stock_code.as_deref(), Some("KP-01"));
    }

    #[test]
    fn parses_price_rows() {
        let csv = "barkod,platform,fiyat\n8691234567890,n11,299.99\n";
        let rows = parse_prices_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].platform_type, "n11");
        assert_eq!(rows[0].price, 299.99);
    }

    #[test]
    fn malformed_price_is_an_error() {
        let csv = "barkod,platform,fiyat\n869,n11,abc\n";
        assert!(parse_prices_csv(csv.as_bytes()).is_err());
    }
}
