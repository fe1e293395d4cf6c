use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{backoff_delay, credential, FetchWindow, MarketplaceClient, OrdersPage};
use crate::database_ops::connections::PlatformConnection;
use crate::mapping::PlatformType;

/// Amazon SP-API (Orders v0 + Listings). Token acquisition/refresh is owned
/// by the back office, which stores a live access token on the connection;
/// this client only spends it. Order items are fetched per order and embedded
/// under `OrderItems` so the mapper sees one self-contained payload.
#[derive(Debug, Clone)]
pub struct AmazonClient {
    base_url: String,
    http: Client,
    access_token: String,
    marketplace_id: String,
    retry_attempts: u32,
    retry_base_ms: u64,
}

impl AmazonClient {
    pub fn from_connection(conn: &PlatformConnection) -> Result<Self> {
        let access_token = credential(conn, "access_token")?;
        let marketplace_id = credential(conn, "marketplace_id")?;
        Self::new(&access_token, &marketplace_id, None)
    }

    pub fn new(
        access_token: &str,
        marketplace_id: &str,
        base_url: Option<&str>,
    ) -> Result<Self> {
        let base_url = base_url
            .unwrap_or("https://sellingpartnerapi-eu.amazon.com")
            .trim_end_matches('/')
            .to_string();
        let http = Client::builder()
            .user_agent("pazarsync/1.0 (Language=Rust)")
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url,
            http,
            access_token: access_token.to_string(),
            marketplace_id: marketplace_id.to_string(),
            retry_attempts: 4,
            retry_base_ms: 1000,
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let resp = self
                .http
                .get(url)
                .header("x-amz-access-token", &self.access_token)
                .send()
                .await;
            match resp {
                Ok(r) if r.status().is_success() => return Ok(r.json::<Value>().await?),
                Ok(r) => {
                    let status = r.status();
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if !retryable || attempt > self.retry_attempts {
                        let body = r.text().await.unwrap_or_default();
                        return Err(anyhow!("amazon http {status}: {body}"));
                    }
                    warn!(status = status.as_u16(), attempt, "sp-api throttled; backing off");
                }
                Err(e) => {
                    if attempt > self.retry_attempts {
                        return Err(e.into());
                    }
                    warn!(error = %e, attempt, "sp-api network error; backing off");
                }
            }
            tokio::time::sleep(backoff_delay(attempt, self.retry_base_ms)).await;
        }
    }

    async fn fetch_order_items(&self, amazon_order_id: &str) -> Result<Vec<Value>> {
        let url = format!("{}/orders/v0/orders/{}/orderItems", self.base_url, amazon_order_id);
        let raw = self.get_json(&url).await?;
        Ok(raw
            .get("payload")
            .and_then(|p| p.get("OrderItems"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl MarketplaceClient for AmazonClient {
    fn platform(&self) -> PlatformType {
        PlatformType::Amazon
    }

    async fn fetch_orders_page(&self, window: &FetchWindow, _page: u32) -> Result<OrdersPage> {
        // SP-API pages by opaque NextToken rather than page numbers; one call
        // per window keeps the sync loop simple and the default window small.
        let mut url = format!(
            "{}/orders/v0/orders?MarketplaceIds={}",
            self.base_url, self.marketplace_id
        );
        if let Some(t) = window.start {
            url.push_str(&format!(
                "&LastUpdatedAfter={}",
                urlencoding::encode(&t.to_rfc3339())
            ));
        }
        if let Some(status) = &window.status {
            url.push_str(&format!("&OrderStatuses={}", urlencoding::encode(status)));
        }
        debug!(%url, "amazon fetch_orders_page");
        let raw = self.get_json(&url).await?;
        let mut orders = raw
            .get("payload")
            .and_then(|p| p.get("Orders"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for order in orders.iter_mut() {
            let Some(id) = order
                .get("AmazonOrderId")
                .and_then(Value::as_str)
                .map(str::to_string)
            else {
                continue;
            };
            match self.fetch_order_items(&id).await {
                Ok(items) => {
                    if let Some(obj) = order.as_object_mut() {
                        obj.insert("OrderItems".to_string(), Value::Array(items));
                    }
                }
                Err(e) => warn!(order_id = %id, error = %e, "order items fetch failed; mapping without lines"),
            }
        }

        Ok(OrdersPage {
            items: orders,
            total_pages: 1,
        })
    }

    async fn fetch_products_page(&self, _page: u32) -> Result<OrdersPage> {
        // Listings sync for Amazon arrives via inventory reports in the back
        // office; the live API exposes no cheap full-catalogue listing.
        Ok(OrdersPage::default())
    }
}
