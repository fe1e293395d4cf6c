// API request/response models (DTOs)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(Meta::now()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            meta: Some(Meta::now()),
        }
    }
}

/// Metadata included in all API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub version: String,
}

impl Meta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: uuid::Uuid::new_v4().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub uptime_seconds: u64,
}

/// Sync trigger request: enqueue an order or product sync for a connection.
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncTriggerRequest {
    pub connection_id: i64,
    /// "order_sync" or "product_import"
    #[serde(default = "default_sync_kind")]
    pub kind: String,
    /// Optional lower bound on lastModifiedDate, RFC3339.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    /// Optional platform status filter passed through to the marketplace.
    #[serde(default)]
    pub status: Option<String>,
}

fn default_sync_kind() -> String {
    "order_sync".to_string()
}

/// Listing query for bulk operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationsQuery {
    pub user_id: i64,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Connection summary exposed to the admin frontend.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub id: i64,
    pub user_id: i64,
    pub platform: String,
    pub name: String,
    pub is_active: bool,
}
