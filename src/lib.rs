pub mod api;
pub mod bulk;
pub mod clients;
pub mod cli;
pub mod database_ops;
pub mod env_boot;
pub mod mapping;
pub mod normalization;
pub mod orchestrator;
pub mod realtime;

pub mod util {
    pub mod env;
}

// Order synchronization pipeline (library function, not a bin): fetch pages
// from one connection's marketplace, map each payload, reconcile into the
// store, and keep the enclosing bulk operation's accounting current.

use anyhow::{Context, Result};
use futures::{stream, StreamExt};
use indexmap::IndexMap;
use tracing::{info, warn};
use uuid::Uuid;

use bulk::{BulkOperationKind, BulkTracker};
use clients::{client_for, FetchWindow};
use database_ops::bulk_operations::{is_cancel_requested, save_progress};
use database_ops::connections::PlatformConnection;
use database_ops::db::Db;
use database_ops::orders::{upsert_order, UpsertAction};
use database_ops::products::upsert_product;
use mapping::{map_order, map_product};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub window: FetchWindow,
    pub max_pages: u32,
    /// Items reconciled concurrently within one page. Small on purpose:
    /// marketplaces rate-limit and the store prefers short row locks.
    pub chunk_parallelism: usize,
    /// Existing bulk_operations row to drive, when the sync runs under one.
    pub operation_id: Option<Uuid>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            window: FetchWindow::default(),
            max_pages: 50,
            chunk_parallelism: 4,
            operation_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SyncSummary {
    pub fetched: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Canonical status distribution of the mapped orders, in first-seen order.
    pub per_status: IndexMap<String, u64>,
}

enum ItemResult {
    Upserted(UpsertAction, &'static str),
    Failed(String, String),
}

/// Sync one connection's orders for a window. Mapping errors and exhausted
/// upsert retries fail the item, never the batch; a cancelled bulk operation
/// stops between pages.
pub async fn sync_orders_pipeline(
    db: &Db,
    conn: &PlatformConnection,
    options: SyncOptions,
) -> Result<SyncSummary> {
    let client = client_for(conn)?;
    let mut summary = SyncSummary::default();
    let mut tracker = BulkTracker::new(BulkOperationKind::OrderSync, 0);
    tracker.start();

    let mut page = 0u32;
    loop {
        if let Some(op_id) = options.operation_id {
            if is_cancel_requested(db, op_id).await.unwrap_or(false) {
                info!(%op_id, "cancellation requested; stopping sync between pages");
                tracker.cancel();
                save_progress(db, op_id, &tracker).await?;
                return Ok(summary);
            }
        }

        let fetched = client
            .fetch_orders_page(&options.window, page)
            .await
            .with_context(|| format!("{} orders page {page}", conn.platform))?;
        if fetched.items.is_empty() {
            break;
        }
        summary.fetched += fetched.items.len() as u64;
        tracker.total_items += fetched.items.len() as u64;

        let results: Vec<ItemResult> = stream::iter(fetched.items.iter())
            .map(|raw| async move {
                match map_order(conn.platform, raw) {
                    Ok(order) => {
                        let status = order.status.as_str();
                        match upsert_with_retry(db, conn, &order).await {
                            Ok(outcome) => ItemResult::Upserted(outcome.action, status),
                            Err(e) => ItemResult::Failed(
                                order.external_order_id.clone(),
                                format!("upsert: {e:#}"),
                            ),
                        }
                    }
                    Err(e) => ItemResult::Failed(
                        raw.get("id")
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| format!("page {page} item")),
                        format!("mapping: {e}"),
                    ),
                }
            })
            .buffer_unordered(options.chunk_parallelism.max(1))
            .collect()
            .await;

        for result in results {
            match result {
                ItemResult::Upserted(action, status) => {
                    tracker.record_success();
                    *summary.per_status.entry(status.to_string()).or_insert(0) += 1;
                    match action {
                        UpsertAction::Inserted => summary.inserted += 1,
                        UpsertAction::Updated => summary.updated += 1,
                        UpsertAction::Skipped => summary.skipped += 1,
                    }
                }
                ItemResult::Failed(item, message) => {
                    warn!(item = %item, %message, "order sync item failed");
                    tracker.record_failure(item, message);
                    summary.failed += 1;
                }
            }
        }

        if let Some(op_id) = options.operation_id {
            save_progress(db, op_id, &tracker).await?;
        }

        page += 1;
        if page >= options.max_pages || (fetched.total_pages > 0 && page >= fetched.total_pages) {
            break;
        }
    }

    tracker.finish();
    if let Some(op_id) = options.operation_id {
        save_progress(db, op_id, &tracker).await?;
    }
    info!(
        platform = %conn.platform,
        connection_id = conn.id,
        fetched = summary.fetched,
        inserted = summary.inserted,
        updated = summary.updated,
        skipped = summary.skipped,
        failed = summary.failed,
        "order sync finished"
    );
    Ok(summary)
}

/// Catalogue import for one connection; same shape as the order pipeline but
/// product rows have no staleness guard (the marketplace listing is the
/// source of truth for price/stock).
pub async fn sync_products_pipeline(
    db: &Db,
    conn: &PlatformConnection,
    options: SyncOptions,
) -> Result<SyncSummary> {
    let client = client_for(conn)?;
    let mut summary = SyncSummary::default();
    let mut tracker = BulkTracker::new(BulkOperationKind::ProductImport, 0);
    tracker.start();

    let mut page = 0u32;
    loop {
        let fetched = client
            .fetch_products_page(page)
            .await
            .with_context(|| format!("{} products page {page}", conn.platform))?;
        if fetched.items.is_empty() {
            break;
        }
        summary.fetched += fetched.items.len() as u64;
        tracker.total_items += fetched.items.len() as u64;

        for raw in &fetched.items {
            match map_product(conn.platform, raw) {
                Ok(product) => match upsert_product(db, conn.user_id, &product).await {
                    Ok(_) => {
                        tracker.record_success();
                        summary.inserted += 1;
                    }
                    Err(e) => {
                        summary.failed += 1;
                        tracker.record_failure(
                            product.external_product_id.clone(),
                            format!("{e:#}"),
                        );
                    }
                },
                Err(e) => {
                    summary.failed += 1;
                    tracker.record_failure(
                        raw.get("id").map(|v| v.to_string()).unwrap_or_default(),
                        format!("mapping: {e}"),
                    );
                }
            }
        }

        if let Some(op_id) = options.operation_id {
            save_progress(db, op_id, &tracker).await?;
        }
        page += 1;
        if page >= options.max_pages || (fetched.total_pages > 0 && page >= fetched.total_pages) {
            break;
        }
    }

    tracker.finish();
    if let Some(op_id) = options.operation_id {
        save_progress(db, op_id, &tracker).await?;
    }
    Ok(summary)
}

/// Bounded retry around the reconciliation write. Constraint hiccups and
/// connection drops get three attempts with backoff; whatever survives that
/// is a real item failure.
async fn upsert_with_retry(
    db: &Db,
    conn: &PlatformConnection,
    order: &mapping::CanonicalOrder,
) -> Result<database_ops::orders::UpsertOutcome> {
    const ATTEMPTS: u32 = 3;
    let mut last_err = None;
    for attempt in 1..=ATTEMPTS {
        match upsert_order(db, conn.user_id, conn.id, order).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) => {
                if attempt < ATTEMPTS {
                    tokio::time::sleep(clients::backoff_delay(attempt, 200)).await;
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("order upsert failed")))
}
