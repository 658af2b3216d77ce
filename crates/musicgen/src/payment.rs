//! Client for the payment session service.

use std::collections::BTreeMap;

use huggnote_core::selection::Selections;
use huggnote_core::types::{OrderId, SongIndex};
use serde::{Deserialize, Serialize};

use crate::http::{endpoint, parse_response, HttpApiError};

pub struct PaymentApi {
    client: reqwest::Client,
    api_url: String,
}

/// Body of `POST /checkout`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutRequest {
    pub order_id: OrderId,
    pub selections: Selections,
    /// Task id behind each selection, keyed by song index.
    pub task_ids: BTreeMap<SongIndex, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    /// Hosted payment page to redirect the customer to.
    pub url: String,
}

impl PaymentApi {
    pub fn new(api_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    pub async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, HttpApiError> {
        let response = self
            .client
            .post(endpoint(&self.api_url, "checkout"))
            .json(request)
            .send()
            .await?;
        let session: CheckoutSession = parse_response(response).await?;
        tracing::info!(order_id = %request.order_id, "Payment session created");
        Ok(session)
    }
}
