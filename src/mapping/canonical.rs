use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Marketplace a connection talks to. Stored as lowercase text in Postgres
/// and in `platform_data.platform_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformType {
    Trendyol,
    N11,
    Hepsiburada,
    Amazon,
}

impl PlatformType {
    pub const ALL: [PlatformType; 4] = [
        PlatformType::Trendyol,
        PlatformType::N11,
        PlatformType::Hepsiburada,
        PlatformType::Amazon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformType::Trendyol => "trendyol",
            PlatformType::N11 => "n11",
            PlatformType::Hepsiburada => "hepsiburada",
            PlatformType::Amazon => "amazon",
        }
    }
}

impl fmt::Display for PlatformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trendyol" => Ok(PlatformType::Trendyol),
            "n11" => Ok(PlatformType::N11),
            "hepsiburada" | "hb" => Ok(PlatformType::Hepsiburada),
            "amazon" => Ok(PlatformType::Amazon),
            other => Err(format!("unknown platform type: {other}")),
        }
    }
}

/// Internal order lifecycle. Every marketplace status string translates into
/// one of these via the per-platform tables in `mapping::*`; values the
/// tables don't know collapse to `Unknown` instead of failing the sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
    Unknown,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
            OrderStatus::Unknown => "unknown",
        }
    }

    /// Terminal statuses never transition again on re-sync unless the
    /// incoming payload is strictly newer.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Returned
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub full_name: Option<String>,
    pub email: Option<String>,
    /// Turkish national id, when the marketplace exposes it for invoicing.
    pub tc_id: Option<String>,
}

/// Address copied from the payload after whitelisting known keys; shapes vary
/// slightly per marketplace so everything stays optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub full_name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub neighborhood: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.address.is_none()
            && self.city.is_none()
            && self.district.is_none()
            && self.neighborhood.is_none()
            && self.postal_code.is_none()
            && self.country.is_none()
            && self.phone.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Resolved against the `products` table after matching; stays `None`
    /// until a barcode/stock-code match is found.
    pub product_id: Option<i64>,
    pub external_line_id: Option<String>,
    pub title: Option<String>,
    pub quantity: i64,
    pub price: f64,
    pub discount: f64,
    pub commission_rate: Option<f64>,
    pub vat_rate: Option<f64>,
    pub barcode: Option<String>,
    pub sku: Option<String>,
}

/// Normalized order, independent of the source marketplace.
/// `(external_order_id, connection_id)` is the reconciliation key; `raw`
/// keeps the original payload verbatim for audit and checksum comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalOrder {
    pub platform: PlatformType,
    pub external_order_id: String,
    pub order_number: Option<String>,
    pub status: OrderStatus,
    pub customer: Customer,
    pub billing_address: Address,
    pub shipping_address: Address,
    pub lines: Vec<OrderLine>,
    pub cargo_tracking_number: Option<String>,
    pub total_amount: f64,
    pub total_discount_amount: f64,
    pub currency: Option<String>,
    pub order_date: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub raw: Value,
}

/// Normalized product listing row for catalogue imports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProduct {
    pub platform: PlatformType,
    pub external_product_id: String,
    pub title: Option<String>,
    pub barcode: Option<String>,
    pub stock_code: Option<String>,
    pub price: f64,
    pub quantity: i64,
    pub raw: Value,
}
