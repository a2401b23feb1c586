//! REST gateway toward the remote order/trade store

use async_trait::async_trait;

use crate::core::{Error, Result};
use crate::persist::{
    CloseTradeRecord, DeletePendingOrderRecord, ExecutedOrderRecord, OpenTradeRecord,
    PendingOrderRecord, PersistenceGateway,
};

/// Gateway speaking JSON over HTTP to the persistence backend.
pub struct RestGateway {
    base_url: String,
    client: reqwest::Client,
}

impl RestGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if !resp.status().is_success() {
            let status = resp.status();
            let txt = resp.text().await.unwrap_or_default();
            return Err(Error::Persistence(format!("{} failed ({}): {}", what, status, txt)));
        }
        Ok(resp)
    }
}

#[async_trait]
impl PersistenceGateway for RestGateway {
    async fn create_pending_order(&self, record: &PendingOrderRecord) -> Result<Option<String>> {
        let url = format!("{}/orders", self.base_url);
        let resp = self.client.post(&url).json(record).send().await?;
        let resp = Self::check(resp, "create_pending_order").await?;

        // The store may re-key the order; pick up its id if it answers one.
        let body = resp.json::<serde_json::Value>().await?;
        Ok(body["orderId"].as_str().map(String::from))
    }

    async fn mark_order_executed(&self, record: &ExecutedOrderRecord) -> Result<()> {
        let url = format!("{}/orders/{}/executed", self.base_url, record.order_id);
        let resp = self.client.post(&url).json(record).send().await?;
        Self::check(resp, "mark_order_executed").await?;
        Ok(())
    }

    async fn delete_pending_order(&self, record: &DeletePendingOrderRecord) -> Result<()> {
        let url = format!("{}/orders/{}", self.base_url, record.order_id);
        let resp = self.client.delete(&url).json(record).send().await?;
        Self::check(resp, "delete_pending_order").await?;
        Ok(())
    }

    async fn create_trade(&self, record: &OpenTradeRecord) -> Result<()> {
        let url = format!("{}/trades", self.base_url);
        let resp = self.client.post(&url).json(record).send().await?;
        Self::check(resp, "create_trade").await?;
        Ok(())
    }

    async fn close_trade(&self, record: &CloseTradeRecord) -> Result<()> {
        let url = format!("{}/trades/{}/close", self.base_url, record.symbol);
        let resp = self.client.post(&url).json(record).send().await?;
        Self::check(resp, "close_trade").await?;
        Ok(())
    }
}
