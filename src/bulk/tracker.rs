//! Progress accounting for long-running batch jobs (imports, price updates,
//! order syncs). The tracker is pure in-memory state; persistence lives in
//! `database_ops::bulk_operations` and mirrors these fields.
//!
//! The tracker never returns an error and never panics: a batch job must be
//! able to hammer it from a hot loop and read a consistent snapshot at any
//! point. Calls that arrive after cancellation or a terminal state are
//! ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOperationKind {
    OrderSync,
    ProductImport,
    ProductExport,
    PriceUpdate,
    StockUpdate,
    Consolidation,
}

impl BulkOperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOperationKind::OrderSync => "order_sync",
            BulkOperationKind::ProductImport => "product_import",
            BulkOperationKind::ProductExport => "product_export",
            BulkOperationKind::PriceUpdate => "price_update",
            BulkOperationKind::StockUpdate => "stock_update",
            BulkOperationKind::Consolidation => "consolidation",
        }
    }
}

impl fmt::Display for BulkOperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkOperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order_sync" => Ok(Self::OrderSync),
            "product_import" => Ok(Self::ProductImport),
            "product_export" => Ok(Self::ProductExport),
            "price_update" => Ok(Self::PriceUpdate),
            "stock_update" => Ok(Self::StockUpdate),
            "consolidation" => Ok(Self::Consolidation),
            other => Err(format!("unknown bulk operation kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOperationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Partial,
}

impl BulkOperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOperationStatus::Pending => "pending",
            BulkOperationStatus::Processing => "processing",
            BulkOperationStatus::Completed => "completed",
            BulkOperationStatus::Failed => "failed",
            BulkOperationStatus::Cancelled => "cancelled",
            BulkOperationStatus::Partial => "partial",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BulkOperationStatus::Completed
                | BulkOperationStatus::Failed
                | BulkOperationStatus::Cancelled
                | BulkOperationStatus::Partial
        )
    }
}

impl fmt::Display for BulkOperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkOperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "partial" => Ok(Self::Partial),
            other => Err(format!("unknown bulk operation status: {other}")),
        }
    }
}

/// Per-item failure, keyed by whatever identifies the item in its source
/// (external order id, CSV row number, barcode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub item: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkTracker {
    pub kind: BulkOperationKind,
    pub status: BulkOperationStatus,
    pub total_items: u64,
    pub processed_items: u64,
    pub successful_items: u64,
    pub failed_items: u64,
    pub errors: Vec<ItemError>,
    pub warnings: Vec<ItemError>,
    /// Set by `fail_fatal` for source-level failures (file unreadable,
    /// connection misconfigured) that bypass per-item accounting.
    pub fatal_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<i64>,
}

impl BulkTracker {
    pub fn new(kind: BulkOperationKind, total_items: u64) -> Self {
        Self {
            kind,
            status: BulkOperationStatus::Pending,
            total_items,
            processed_items: 0,
            successful_items: 0,
            failed_items: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            fatal_error: None,
            started_at: None,
            completed_at: None,
            processing_time_ms: None,
        }
    }

    /// pending -> processing. Ignored from any other state.
    pub fn start(&mut self) {
        if self.status == BulkOperationStatus::Pending {
            self.status = BulkOperationStatus::Processing;
            self.started_at = Some(Utc::now());
        }
    }

    /// Resume accounting after a restart: trust the persisted counters and
    /// continue from the stored offset.
    pub fn resume(&mut self, processed: u64, successful: u64, failed: u64) {
        if self.status.is_terminal() {
            return;
        }
        self.status = BulkOperationStatus::Processing;
        self.processed_items = processed;
        self.successful_items = successful;
        self.failed_items = failed;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    pub fn record_success(&mut self) {
        if !self.accepting_items() {
            return;
        }
        self.processed_items += 1;
        self.successful_items += 1;
    }

    pub fn record_failure(&mut self, item: impl Into<String>, message: impl Into<String>) {
        if !self.accepting_items() {
            return;
        }
        self.processed_items += 1;
        self.failed_items += 1;
        self.errors.push(ItemError {
            item: item.into(),
            message: message.into(),
        });
    }

    /// A mapping/reconcile oddity that did not fail the item.
    pub fn record_warning(&mut self, item: impl Into<String>, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.warnings.push(ItemError {
            item: item.into(),
            message: message.into(),
        });
    }

    /// Percentage 0-100, rounded to two decimals; 0 when nothing to do yet.
    pub fn progress(&self) -> f64 {
        if self.total_items == 0 {
            return 0.0;
        }
        let pct = (self.processed_items as f64) / (self.total_items as f64) * 100.0;
        (pct * 100.0).round() / 100.0
    }

    /// Terminal classification once every item has been accounted for:
    /// completed when nothing failed, failed when everything did, partial in
    /// between. Ignored after cancel/fatal.
    pub fn finish(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = if self.failed_items == 0 {
            BulkOperationStatus::Completed
        } else if self.failed_items >= self.total_items && self.total_items > 0 {
            BulkOperationStatus::Failed
        } else if self.processed_items == self.failed_items && self.total_items == 0 {
            BulkOperationStatus::Failed
        } else {
            BulkOperationStatus::Partial
        };
        self.mark_done();
    }

    /// External cancellation signal. Later item results are dropped.
    pub fn cancel(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = BulkOperationStatus::Cancelled;
        self.mark_done();
    }

    /// Source-level failure: transition straight to `failed` with a top-level
    /// message, bypassing per-item accounting.
    pub fn fail_fatal(&mut self, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.fatal_error = Some(message.into());
        self.status = BulkOperationStatus::Failed;
        self.mark_done();
    }

    fn accepting_items(&self) -> bool {
        matches!(
            self.status,
            BulkOperationStatus::Pending | BulkOperationStatus::Processing
        )
    }

    fn mark_done(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        if let Some(started) = self.started_at {
            self.processing_time_ms = Some((now - started).num_milliseconds());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariant(t: &BulkTracker) {
        assert_eq!(t.processed_items, t.successful_items + t.failed_items);
        if t.total_items > 0 {
            let expected =
                (t.processed_items as f64) / (t.total_items as f64) * 100.0;
            assert!((t.progress() - expected).abs() < 0.01);
        } else {
            assert_eq!(t.progress(), 0.0);
        }
    }

    #[test]
    fn lifecycle_all_success_is_completed() {
        let mut t = BulkTracker::new(BulkOperationKind::OrderSync, 10);
        t.start();
        assert_eq!(t.status, BulkOperationStatus::Processing);
        for _ in 0..10 {
            t.record_success();
            assert_invariant(&t);
        }
        t.finish();
        assert_eq!(t.status, BulkOperationStatus::Completed);
        assert_eq!(t.progress(), 100.0);
        assert!(t.completed_at.is_some());
        assert!(t.processing_time_ms.is_some());
    }

    #[test]
    fn all_failed_is_failed() {
        let mut t = BulkTracker::new(BulkOperationKind::ProductImport, 10);
        t.start();
        for i in 0..10 {
            t.record_failure(format!("row {i}"), "boom");
            assert_invariant(&t);
        }
        t.finish();
        assert_eq!(t.status, BulkOperationStatus::Failed);
        assert_eq!(t.errors.len(), 10);
    }

    #[test]
    fn mixed_results_are_partial() {
        let mut t = BulkTracker::new(BulkOperationKind::PriceUpdate, 10);
        t.start();
        for _ in 0..7 {
            t.record_success();
        }
        for i in 0..3 {
            t.record_failure(format!("item {i}"), "stale");
        }
        assert_invariant(&t);
        t.finish();
        assert_eq!(t.status, BulkOperationStatus::Partial);
        assert_eq!(t.failed_items, 3);
    }

    #[test]
    fn results_after_cancel_are_dropped() {
        let mut t = BulkTracker::new(BulkOperationKind::OrderSync, 5);
        t.start();
        t.record_success();
        t.cancel();
        t.record_success();
        t.record_failure("x", "y");
        assert_eq!(t.status, BulkOperationStatus::Cancelled);
        assert_eq!(t.processed_items, 1);
        assert_eq!(t.successful_items, 1);
        assert_eq!(t.failed_items, 0);
        assert_invariant(&t);
    }

    #[test]
    fn finish_after_cancel_keeps_cancelled() {
        let mut t = BulkTracker::new(BulkOperationKind::OrderSync, 5);
        t.start();
        t.cancel();
        t.finish();
        assert_eq!(t.status, BulkOperationStatus::Cancelled);
    }

    #[test]
    fn fatal_error_skips_item_accounting() {
        let mut t = BulkTracker::new(BulkOperationKind::ProductImport, 100);
        t.fail_fatal("source file unreadable: import.csv");
        assert_eq!(t.status, BulkOperationStatus::Failed);
        assert_eq!(t.processed_items, 0);
        assert_eq!(t.fatal_error.as_deref(), Some("source file unreadable: import.csv"));
    }

    #[test]
    fn resume_continues_from_offset() {
        let mut t = BulkTracker::new(BulkOperationKind::OrderSync, 10);
        t.resume(6, 5, 1);
        assert_eq!(t.status, BulkOperationStatus::Processing);
        assert_eq!(t.progress(), 60.0);
        for _ in 0..4 {
            t.record_success();
        }
        t.finish();
        assert_eq!(t.status, BulkOperationStatus::Partial);
        assert_invariant(&t);
    }

    #[test]
    fn empty_batch_finishes_completed() {
        let mut t = BulkTracker::new(BulkOperationKind::Consolidation, 0);
        t.start();
        t.finish();
        assert_eq!(t.status, BulkOperationStatus::Completed);
        assert_eq!(t.progress(), 0.0);
    }

    #[test]
    fn warnings_do_not_touch_counters() {
        let mut t = BulkTracker::new(BulkOperationKind::OrderSync, 2);
        t.start();
        t.record_warning("order 1", "unknown status label; mapped to unknown");
        t.record_success();
        assert_eq!(t.processed_items, 1);
        assert_eq!(t.warnings.len(), 1);
        assert_invariant(&t);
    }
}
