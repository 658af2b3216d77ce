//! Client for the external music generation service.
//!
//! One call renders one variation. The service answers immediately with an
//! opaque task id; audio and lyrics arrive later through the result
//! webhook, not through this client.

use serde::{Deserialize, Serialize};

use crate::http::{endpoint, parse_response, HttpApiError};

/// HTTP client for the generation service.
pub struct MusicApi {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

/// Body of `POST /generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub music_style: Option<String>,
    pub voice_hint: Option<String>,
    pub instrumental: bool,
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    /// Handle used to correlate the later webhook delivery.
    pub task_id: String,
}

impl MusicApi {
    /// * `api_url` - Base HTTP URL of the generation service.
    /// * `api_key` - Bearer key, if the service requires one.
    pub fn new(api_url: String, api_key: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, api_key)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            api_url,
            api_key,
        }
    }

    /// Submit one variation for rendering. Returns the task id.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, HttpApiError> {
        let mut builder = self
            .client
            .post(endpoint(&self.api_url, "generate"))
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        let parsed: GenerateResponse = parse_response(response).await?;
        if parsed.task_id.trim().is_empty() {
            return Err(HttpApiError::Unexpected(
                "generation service returned an empty task id".to_string(),
            ));
        }
        Ok(parsed)
    }
}
