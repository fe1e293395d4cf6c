//! Unmatched-line diagnostics: where manual product reconciliation is needed.

use anyhow::Result;
use sqlx::Row;

use crate::database_ops::db::Db;
use crate::util::env as env_util;

pub async fn run(database_url: Option<String>) -> Result<()> {
    env_util::init_env();
    let db_url = match database_url {
        Some(url) => url,
        None => env_util::db_url()?,
    };
    let db = Db::connect_no_migrate(&db_url, 5).await?;

    let rows = sqlx::query(
        r#"
        SELECT o.platform_type,
               COUNT(*)::bigint AS lines,
               COUNT(*) FILTER (WHERE oi.product_id IS NULL)::bigint AS unmatched,
               COUNT(*) FILTER (WHERE oi.product_id IS NULL AND oi.barcode IS NOT NULL)::bigint AS unmatched_with_barcode
        FROM order_items oi
        JOIN orders o ON o.id = oi.order_id
        GROUP BY o.platform_type
        ORDER BY unmatched DESC
        "#,
    )
    .persistent(false)
    .fetch_all(&db.pool)
    .await?;

    println!("ORDER LINE MATCH COVERAGE:");
    for r in rows {
        let platform: String = r.get("platform_type");
        let lines: i64 = r.get("lines");
        let unmatched: i64 = r.get("unmatched");
        let with_barcode: i64 = r.get("unmatched_with_barcode");
        let pct = if lines > 0 {
            ((lines - unmatched) as f64) * 100.0 / (lines as f64)
        } else {
            100.0
        };
        println!(
            "  {platform}: {lines} lines, {unmatched} unmatched ({pct:.1}% matched), {with_barcode} unmatched despite barcode"
        );
    }

    // The barcodes most worth fixing first: highest unmatched-line counts.
    let top = sqlx::query(
        r#"
        SELECT oi.barcode, COUNT(*)::bigint AS n
        FROM order_items oi
        WHERE oi.product_id IS NULL AND oi.barcode IS NOT NULL
        GROUP BY oi.barcode
        ORDER BY n DESC
        LIMIT 10
        "#,
    )
    .persistent(false)
    .fetch_all(&db.pool)
    .await
    .unwrap_or_default();
    if !top.is_empty() {
        println!("top unmatched barcodes (limit 10):");
        for r in top {
            let barcode: String = r.get("barcode");
            let n: i64 = r.get("n");
            println!("  {barcode}: {n}");
        }
    }

    Ok(())
}
