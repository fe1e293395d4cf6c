pub mod tracker;

pub use tracker::{BulkOperationKind, BulkOperationStatus, BulkTracker, ItemError};
