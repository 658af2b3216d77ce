//! HTTP client for the order record service.
//!
//! Every response carries the `{ "data": ... }` envelope the service wraps
//! around its payloads.

use async_trait::async_trait;
use huggnote_core::record::{NewOrder, OrderPatch, OrderRecord};
use huggnote_core::types::{OrderId, SongIndex};
use huggnote_musicgen::http::{endpoint, parse_response};
use huggnote_musicgen::HttpApiError;
use serde::Deserialize;

/// Server-side order records, as consumed by the persistence mirror.
#[async_trait]
pub trait RecordService: Send + Sync {
    /// `None` when the service has no record with this id.
    async fn fetch(&self, id: &OrderId) -> Result<Option<OrderRecord>, HttpApiError>;

    async fn create(&self, order: &NewOrder) -> Result<OrderRecord, HttpApiError>;

    /// Merge `patch` into the stored record and return the result.
    async fn patch(&self, id: &OrderId, patch: &OrderPatch) -> Result<OrderRecord, HttpApiError>;

    /// Drop one song's variation slots ahead of a manual retry.
    async fn reset_song(&self, id: &OrderId, index: SongIndex)
        -> Result<OrderRecord, HttpApiError>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

pub struct RecordClient {
    client: reqwest::Client,
    base_url: String,
}

impl RecordClient {
    /// * `base_url` - Service root including the API prefix, e.g.
    ///   `http://localhost:3000/api/v1`.
    pub fn new(base_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    fn order_url(&self, id: &OrderId) -> String {
        endpoint(&self.base_url, &format!("orders/{id}"))
    }
}

#[async_trait]
impl RecordService for RecordClient {
    async fn fetch(&self, id: &OrderId) -> Result<Option<OrderRecord>, HttpApiError> {
        let response = self.client.get(self.order_url(id)).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let envelope: Envelope<OrderRecord> = parse_response(response).await?;
        Ok(Some(envelope.data))
    }

    async fn create(&self, order: &NewOrder) -> Result<OrderRecord, HttpApiError> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "orders"))
            .json(order)
            .send()
            .await?;
        let envelope: Envelope<OrderRecord> = parse_response(response).await?;
        Ok(envelope.data)
    }

    async fn patch(&self, id: &OrderId, patch: &OrderPatch) -> Result<OrderRecord, HttpApiError> {
        let response = self
            .client
            .patch(self.order_url(id))
            .json(patch)
            .send()
            .await?;
        let envelope: Envelope<OrderRecord> = parse_response(response).await?;
        Ok(envelope.data)
    }

    async fn reset_song(
        &self,
        id: &OrderId,
        index: SongIndex,
    ) -> Result<OrderRecord, HttpApiError> {
        let url = endpoint(&self.base_url, &format!("orders/{id}/songs/{index}/variations"));
        let response = self.client.delete(url).send().await?;
        let envelope: Envelope<OrderRecord> = parse_response(response).await?;
        Ok(envelope.data)
    }
}
