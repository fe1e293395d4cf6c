//! Thin marketplace API clients. Each returns raw `serde_json::Value`
//! payloads; interpreting them is the mapping layer's job. Timeouts live on
//! the underlying reqwest client, retries are bounded with jittered
//! exponential backoff.

pub mod amazon;
pub mod hepsiburada;
pub mod trendyol;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::Value;
use std::time::Duration;

use crate::database_ops::connections::PlatformConnection;
use crate::mapping::PlatformType;
use n11_client::{N11Client, N11Config};

#[derive(Debug, Clone, Default)]
pub struct FetchWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OrdersPage {
    pub items: Vec<Value>,
    pub total_pages: u32,
}

#[async_trait]
pub trait MarketplaceClient: Send + Sync {
    fn platform(&self) -> PlatformType;
    async fn fetch_orders_page(&self, window: &FetchWindow, page: u32) -> Result<OrdersPage>;
    async fn fetch_products_page(&self, page: u32) -> Result<OrdersPage>;
}

/// Pull a credential string out of a connection's opaque JSON blob.
pub(crate) fn credential(conn: &PlatformConnection, key: &str) -> Result<String> {
    conn.credentials
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            anyhow!(
                "connection {} ({}) is missing credential `{key}`",
                conn.id,
                conn.platform
            )
        })
}

/// Jittered exponential backoff delay for attempt N (1-based). Jitter keeps
/// parallel workers from stampeding a rate-limited marketplace in lockstep.
pub(crate) fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(6));
    let jitter = rand::thread_rng().gen_range(0..=exp / 4 + 1);
    Duration::from_millis(exp + jitter)
}

/// Build the right client for a connection.
pub fn client_for(conn: &PlatformConnection) -> Result<Box<dyn MarketplaceClient>> {
    match conn.platform {
        PlatformType::Trendyol => Ok(Box::new(trendyol::TrendyolClient::from_connection(conn)?)),
        PlatformType::Hepsiburada => Ok(Box::new(hepsiburada::HepsiburadaClient::from_connection(
            conn,
        )?)),
        PlatformType::Amazon => Ok(Box::new(amazon::AmazonClient::from_connection(conn)?)),
        PlatformType::N11 => Ok(Box::new(N11Adapter::from_connection(conn)?)),
    }
}

/// Adapter over the `n11-client` crate so N11 satisfies the same trait as the
/// in-repo clients.
pub struct N11Adapter {
    inner: N11Client,
}

impl N11Adapter {
    pub fn from_connection(conn: &PlatformConnection) -> Result<Self> {
        let app_key = credential(conn, "app_key")?;
        let app_secret = credential(conn, "app_secret")?;
        let cfg = N11Config::default().with_credentials(&app_key, &app_secret);
        Ok(Self {
            inner: N11Client::new(cfg).map_err(|e| anyhow!("n11 client: {e}"))?,
        })
    }
}

#[async_trait]
impl MarketplaceClient for N11Adapter {
    fn platform(&self) -> PlatformType {
        PlatformType::N11
    }

    async fn fetch_orders_page(&self, window: &FetchWindow, page: u32) -> Result<OrdersPage> {
        let resp = self
            .inner
            .list_orders(window.status.as_deref(), window.start, window.end, page)
            .await
            .map_err(|e| anyhow!("n11 list_orders: {e}"))?;
        Ok(OrdersPage {
            items: resp.content,
            total_pages: resp.total_pages,
        })
    }

    async fn fetch_products_page(&self, page: u32) -> Result<OrdersPage> {
        let raw = self
            .inner
            .list_products(page)
            .await
            .map_err(|e| anyhow!("n11 list_products: {e}"))?;
        let items = raw
            .get("content")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let total_pages = raw
            .get("totalPages")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;
        Ok(OrdersPage { items, total_pages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let base = 500;
        let d1 = backoff_delay(1, base).as_millis() as u64;
        let d4 = backoff_delay(4, base).as_millis() as u64;
        assert!(d1 >= base && d1 <= base + base / 4 + 1);
        assert!(d4 >= base * 8);
        // cap at 2^6
        let d20 = backoff_delay(20, base).as_millis() as u64;
        assert!(d20 <= base * 64 + base * 16 + 1);
    }
}
