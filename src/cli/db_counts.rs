use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::Row;
use std::{env, str::FromStr};

use crate::util::env as env_util;

#[derive(Debug, Clone, Default)]
pub struct DbCountsConfig {
    /// Optional override for the Postgres connection string.
    pub database_url: Option<String>,
    /// Force whether recent orders should be displayed (defaults to env RECENT_ORDERS).
    pub show_recent_orders: Option<bool>,
    /// Override the recent orders LIMIT (defaults to env RECENT_ORDERS_LIMIT or 20).
    pub recent_orders_limit: Option<i64>,
}

pub async fn run(cfg: DbCountsConfig) -> Result<()> {
    // Centralize dotenv loading + DB URL resolution.
    env_util::init_env();
    let mut out = String::new();
    let db_url = if let Some(url) = cfg.database_url.clone() {
        url
    } else {
        env_util::db_url().map_err(|e| {
            anyhow::anyhow!("Database URL env resolved to empty string; check DATABASE_URL ({e})")
        })?
    };
    let mut connect_options = PgConnectOptions::from_str(&db_url)?.statement_cache_capacity(0);

    // Ensure TLS is enabled when DSN contains sslmode=require
    if db_url.contains("sslmode=require") && !db_url.contains("sslmode=disable") {
        connect_options = connect_options.ssl_mode(PgSslMode::Require);
    }

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await?;

    fn is_undefined_table_error(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("42P01"),
            _ => false,
        }
    }

    fn is_undefined_column_error(err: &sqlx::Error) -> bool {
        match err {
            // undefined_column
            sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("42703"),
            _ => false,
        }
    }

    macro_rules! count {
        ($sql:expr) => {
            match sqlx::query_scalar::<_, i64>($sql)
                .persistent(false)
                .fetch_one(&pool)
                .await
            {
                Ok(val) => val,
                Err(e) if is_undefined_table_error(&e) => 0,
                Err(e) => return Err(e.into()),
            }
        };
    }

    macro_rules! count_lenient {
        ($sql:expr) => {
            match sqlx::query_scalar::<_, i64>($sql)
                .persistent(false)
                .fetch_one(&pool)
                .await
            {
                Ok(val) => val,
                Err(e) if is_undefined_table_error(&e) || is_undefined_column_error(&e) => 0,
                Err(e) => return Err(e.into()),
            }
        };
    }

    let connections = count!("SELECT count(*) FROM platform_connections");
    let active_connections =
        count!("SELECT count(*) FROM platform_connections WHERE is_active");
    let products = count!("SELECT count(*) FROM products");
    let products_with_barcode =
        count!("SELECT count(*) FROM products WHERE normalized_barcode IS NOT NULL");
    let orders = count!("SELECT count(*) FROM orders");
    let orders_24h =
        count!("SELECT count(*) FROM orders WHERE last_synced_at > now() - interval '1 day'");
    let order_items = count!("SELECT count(*) FROM order_items");
    let matched_items = count!("SELECT count(*) FROM order_items WHERE product_id IS NOT NULL");
    let platform_rows = count!("SELECT count(*) FROM platform_data");
    let bulk_ops = count!("SELECT count(*) FROM bulk_operations");
    let bulk_active = count!(
        "SELECT count(*) FROM bulk_operations WHERE status IN ('pending','processing')"
    );
    let jobs_queued = count_lenient!("SELECT count(*) FROM sync_jobs WHERE status='queued'");
    let consolidated = count_lenient!(
        "SELECT count(*) FROM orders WHERE consolidated_group_id IS NOT NULL"
    );

    use std::fmt::Write as _;
    writeln!(out, "DB COUNTS SUMMARY:").ok();
    writeln!(
        out,
        "platform_connections: {connections} (active: {active_connections})"
    )
    .ok();
    writeln!(
        out,
        "products: {products} (with barcode: {products_with_barcode})"
    )
    .ok();
    writeln!(out, "orders: {orders} (synced last 24h: {orders_24h})").ok();
    writeln!(
        out,
        "order_items: {order_items} (matched to products: {matched_items})"
    )
    .ok();
    writeln!(out, "orders in consolidation groups: {consolidated}").ok();
    writeln!(out, "platform_data rows: {platform_rows}").ok();
    writeln!(out, "bulk_operations: {bulk_ops} (active: {bulk_active})").ok();
    writeln!(out, "sync_jobs queued: {jobs_queued}").ok();
    println!("{}", out);
    out.clear();

    // Per-platform order/status distribution.
    let status_rows = sqlx::query(
        r#"
        SELECT platform_type, order_status, COUNT(*)::bigint AS n
        FROM orders
        GROUP BY platform_type, order_status
        ORDER BY platform_type, n DESC
        "#,
    )
    .persistent(false)
    .fetch_all(&pool)
    .await
    .unwrap_or_default();
    if !status_rows.is_empty() {
        writeln!(out, "orders by platform/status:").ok();
        let mut current: Option<String> = None;
        for r in status_rows {
            let platform: String = r.get("platform_type");
            let status: String = r.get("order_status");
            let n: i64 = r.get("n");
            if current.as_deref() != Some(platform.as_str()) {
                writeln!(out, "  {platform}:").ok();
                current = Some(platform.clone());
            }
            writeln!(out, "    {status}: {n}").ok();
        }
        println!("{}", out);
        out.clear();
    }

    // Bulk operation health: most recent runs with their outcome.
    let op_rows = sqlx::query(
        r#"
        SELECT kind, status, processed_items, total_items, failed_items,
               processing_time_ms, created_at
        FROM bulk_operations
        ORDER BY created_at DESC
        LIMIT 10
        "#,
    )
    .persistent(false)
    .fetch_all(&pool)
    .await
    .unwrap_or_default();
    if !op_rows.is_empty() {
        writeln!(out, "recent bulk operations (latest 10):").ok();
        for r in op_rows {
            let kind: String = r.get("kind");
            let status: String = r.get("status");
            let processed: i64 = r.get("processed_items");
            let total: i64 = r.get("total_items");
            let failed: i64 = r.get("failed_items");
            let elapsed: Option<i64> = r.try_get("processing_time_ms").ok().flatten();
            let created: DateTime<Utc> = r.get("created_at");
            let elapsed_s = elapsed
                .map(|ms| format!(", {ms}ms"))
                .unwrap_or_default();
            writeln!(
                out,
                "  {} {kind} [{status}] {processed}/{total} (failed {failed}{elapsed_s})",
                created.format("%Y-%m-%d %H:%M")
            )
            .ok();
        }
        println!("{}", out);
        out.clear();
    }

    let want_recent_orders = cfg.show_recent_orders.unwrap_or_else(|| {
        env::var("RECENT_ORDERS")
            .ok()
            .map(|v| (v == "1" || v.eq_ignore_ascii_case("true")))
            .unwrap_or(false)
    });
    if want_recent_orders {
        let limit: i64 = cfg.recent_orders_limit.unwrap_or_else(|| {
            env::var("RECENT_ORDERS_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20)
        });
        let recent = sqlx::query(
            r#"
            SELECT o.external_order_id, o.platform_type, o.order_status,
                   o.total_minor, o.order_date
            FROM orders o
            ORDER BY o.order_date DESC NULLS LAST, o.created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .persistent(false)
        .fetch_all(&pool)
        .await
        .unwrap_or_default();
        writeln!(out, "recent orders (by order_date desc, limit {limit}):").ok();
        for r in recent {
            let external_id: String = r.get("external_order_id");
            let platform: String = r.get("platform_type");
            let status: String = r.get("order_status");
            let total_minor: i64 = r.get("total_minor");
            let order_date: Option<DateTime<Utc>> = r.try_get("order_date").ok().flatten();
            writeln!(
                out,
                "  {} [{}] {} — {:.2} TL — {}",
                external_id,
                platform,
                status,
                (total_minor as f64) / 100.0,
                order_date
                    .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "no-date".to_string())
            )
            .ok();
        }
        println!("{}", out);
        out.clear();
    }

    Ok(())
}
