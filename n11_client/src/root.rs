use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dotenv::dotenv;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum N11Error {
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network: {0}")]
    Net(#[from] reqwest::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("other: {0}")]
    Other(String),
}

/// Marketplace order listing page as returned by the N11 order service.
/// `content` is kept as raw JSON; interpretation belongs to the caller's
/// field-mapping layer, not the transport client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct N11OrderPage {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default, rename = "totalPages")]
    pub total_pages: u32,
    #[serde(default, rename = "totalElements")]
    pub total_elements: u64,
    #[serde(default, rename = "pageable")]
    pub pageable: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct N11Config {
    pub base_url: String,
    pub app_key: String,
    pub app_secret: String,
    pub page_size: u32,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub extra_headers: HashMap<String, String>,
}

impl Default for N11Config {
    fn default() -> Self {
        dotenv().ok();
        let app_key = std::env::var("N11_APP_KEY").unwrap_or_default();
        let app_secret = std::env::var("N11_APP_SECRET").unwrap_or_default();
        let page_size = std::env::var("N11_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(50);
        let retry_attempts = std::env::var("N11_RETRY_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4);
        let retry_base_delay_ms = std::env::var("N11_RETRY_BASE_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(500);
        Self {
            base_url: std::env::var("N11_BASE_URL")
                .unwrap_or_else(|_| "https://api.n11.com/ms".into()),
            app_key,
            app_secret,
            page_size,
            retry_attempts,
            retry_base_delay_ms,
            extra_headers: HashMap::new(),
        }
    }
}

impl N11Config {
    pub fn with_credentials(mut self, app_key: &str, app_secret: &str) -> Self {
        self.app_key = app_key.to_string();
        self.app_secret = app_secret.to_string();
        self
    }
}

#[derive(Clone)]
pub struct N11Client {
    http: Client,
    cfg: Arc<N11Config>,
}

impl N11Client {
    pub fn new(cfg: N11Config) -> Result<Self, N11Error> {
        let http = Client::builder()
            .user_agent("N11Client/1.0")
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            cfg: Arc::new(cfg),
        })
    }

    fn headers(&self) -> Result<HeaderMap, N11Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("appkey"),
            HeaderValue::from_str(&self.cfg.app_key)
                .map_err(|e| N11Error::Other(format!("invalid appkey header: {e}")))?,
        );
        headers.insert(
            HeaderName::from_static("appsecret"),
            HeaderValue::from_str(&self.cfg.app_secret)
                .map_err(|e| N11Error::Other(format!("invalid appsecret header: {e}")))?,
        );
        for (k, v) in &self.cfg.extra_headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| N11Error::Other(format!("invalid header name {k}: {e}")))?;
            let value = HeaderValue::from_str(v)
                .map_err(|e| N11Error::Other(format!("invalid header value for {k}: {e}")))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    /// GET with bounded retries. 429 and 5xx are retried with exponential
    /// backoff; 4xx other than 429 fail immediately (payload errors don't
    /// improve on retry).
    async fn get_json(&self, url: &str) -> Result<Value, N11Error> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let resp = self
                .http
                .get(url)
                .headers(self.headers()?)
                .send()
                .await;

            match resp {
                Ok(r) => {
                    let status = r.status();
                    if status.is_success() {
                        return Ok(r.json::<Value>().await?);
                    }
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    let body = r.text().await.unwrap_or_default();
                    if !retryable || attempt > self.cfg.retry_attempts {
                        return Err(N11Error::Http {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    warn!(
                        status = status.as_u16(),
                        attempt, "n11 request throttled/failed; backing off"
                    );
                }
                Err(e) => {
                    if attempt > self.cfg.retry_attempts {
                        return Err(N11Error::Net(e));
                    }
                    warn!(error = %e, attempt, "n11 network error; backing off");
                }
            }

            let delay = self
                .cfg
                .retry_base_delay_ms
                .saturating_mul(1u64 << (attempt - 1).min(6));
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    /// List shipment packages (orders) in a modification-date window.
    /// Dates are sent as epoch milliseconds, which is what the order service
    /// itself emits in payload timestamps.
    pub async fn list_orders(
        &self,
        status: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        page: u32,
    ) -> Result<N11OrderPage, N11Error> {
        let mut url = format!(
            "{}/order/order-list?page={}&size={}",
            self.cfg.base_url.trim_end_matches('/'),
            page,
            self.cfg.page_size
        );
        if let Some(s) = status {
            url.push_str(&format!("&status={s}"));
        }
        if let Some(t) = start {
            url.push_str(&format!("&startDate={}", t.timestamp_millis()));
        }
        if let Some(t) = end {
            url.push_str(&format!("&endDate={}", t.timestamp_millis()));
        }
        debug!(%url, "n11 list_orders");
        let raw = self.get_json(&url).await?;
        Ok(serde_json::from_value(raw)?)
    }

    /// Fetch a single order detail by its numeric order id.
    pub async fn order_detail(&self, order_id: &str) -> Result<Value, N11Error> {
        let url = format!(
            "{}/order/order-detail?id={}",
            self.cfg.base_url.trim_end_matches('/'),
            order_id
        );
        self.get_json(&url).await
    }

    /// List products in the seller catalogue, paged.
    pub async fn list_products(&self, page: u32) -> Result<Value, N11Error> {
        let url = format!(
            "{}/product/tasks/product-list?page={}&size={}",
            self.cfg.base_url.trim_end_matches('/'),
            page,
            self.cfg.page_size
        );
        self.get_json(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_page_tolerates_missing_fields() {
        let page: N11OrderPage = serde_json::from_value(serde_json::json!({
            "content": [{"id": 1}]
        }))
        .unwrap();
        assert_eq!(page.content.len(), 1);
        assert_eq!(page.total_pages, 0);
        assert_eq!(page.total_elements, 0);
    }

    #[test]
    fn config_defaults_are_sane() {
        let cfg = N11Config {
            base_url: "https://api.n11.com/ms".into(),
            app_key: "k".into(),
            app_secret: "s".into(),
            page_size: 50,
            retry_attempts: 4,
            retry_base_delay_ms: 500,
            extra_headers: HashMap::new(),
        };
        let client = N11Client::new(cfg).unwrap();
        assert!(client.headers().unwrap().contains_key("appkey"));
    }
}
