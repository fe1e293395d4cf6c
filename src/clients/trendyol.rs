use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{backoff_delay, credential, FetchWindow, MarketplaceClient, OrdersPage};
use crate::database_ops::connections::PlatformConnection;
use crate::mapping::PlatformType;

/// Trendyol supplier API. Auth is HTTP basic over api key/secret; every
/// endpoint lives under the supplier id.
#[derive(Debug, Clone)]
pub struct TrendyolClient {
    base_url: String,
    http: Client,
    supplier_id: String,
    auth_header: String,
    retry_attempts: u32,
    retry_base_ms: u64,
}

impl TrendyolClient {
    pub fn from_connection(conn: &PlatformConnection) -> Result<Self> {
        let api_key = credential(conn, "api_key")?;
        let api_secret = credential(conn, "api_secret")?;
        let supplier_id = credential(conn, "supplier_id")?;
        Self::new(&api_key, &api_secret, &supplier_id, None)
    }

    pub fn new(
        api_key: &str,
        api_secret: &str,
        supplier_id: &str,
        base_url: Option<&str>,
    ) -> Result<Self> {
        let base_url = base_url
            .unwrap_or("https://api.trendyol.com/sapigw")
            .trim_end_matches('/')
            .to_string();
        let http = Client::builder()
            .user_agent(format!("{supplier_id} - SelfIntegration"))
            .timeout(Duration::from_secs(30))
            .build()?;
        let token =
            base64::engine::general_purpose::STANDARD.encode(format!("{api_key}:{api_secret}"));
        Ok(Self {
            base_url,
            http,
            supplier_id: supplier_id.to_string(),
            auth_header: format!("Basic {token}"),
            retry_attempts: 4,
            retry_base_ms: 500,
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let resp = self
                .http
                .get(url)
                .header("Authorization", &self.auth_header)
                .send()
                .await;
            match resp {
                Ok(r) if r.status().is_success() => return Ok(r.json::<Value>().await?),
                Ok(r) => {
                    let status = r.status();
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if !retryable || attempt > self.retry_attempts {
                        let body = r.text().await.unwrap_or_default();
                        return Err(anyhow!("trendyol http {status}: {body}"));
                    }
                    warn!(status = status.as_u16(), attempt, "trendyol throttled; backing off");
                }
                Err(e) => {
                    if attempt > self.retry_attempts {
                        return Err(e.into());
                    }
                    warn!(error = %e, attempt, "trendyol network error; backing off");
                }
            }
            tokio::time::sleep(backoff_delay(attempt, self.retry_base_ms)).await;
        }
    }
}

#[async_trait]
impl MarketplaceClient for TrendyolClient {
    fn platform(&self) -> PlatformType {
        PlatformType::Trendyol
    }

    async fn fetch_orders_page(&self, window: &FetchWindow, page: u32) -> Result<OrdersPage> {
        let mut url = format!(
            "{}/suppliers/{}/orders?page={}&size=50&orderByField=LastModifiedDate&orderByDirection=ASC",
            self.base_url, self.supplier_id, page
        );
        if let Some(status) = &window.status {
            url.push_str(&format!("&status={}", urlencoding::encode(status)));
        }
        if let Some(t) = window.start {
            url.push_str(&format!("&startDate={}", t.timestamp_millis()));
        }
        if let Some(t) = window.end {
            url.push_str(&format!("&endDate={}", t.timestamp_millis()));
        }
        debug!(%url, "trendyol fetch_orders_page");
        let raw = self.get_json(&url).await?;
        Ok(OrdersPage {
            items: raw
                .get("content")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            total_pages: raw.get("totalPages").and_then(Value::as_u64).unwrap_or(0) as u32,
        })
    }

    async fn fetch_products_page(&self, page: u32) -> Result<OrdersPage> {
        let url = format!(
            "{}/suppliers/{}/products?page={}&size=100",
            self.base_url, self.supplier_id, page
        );
        let raw = self.get_json(&url).await?;
        Ok(OrdersPage {
            items: raw
                .get("content")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            total_pages: raw.get("totalPages").and_then(Value::as_u64).unwrap_or(0) as u32,
        })
    }
}
