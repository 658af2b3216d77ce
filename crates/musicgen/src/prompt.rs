//! Client for the prompt builder service.

use huggnote_core::prompt::PromptInputs;
use serde::Deserialize;

use crate::http::{endpoint, parse_response, HttpApiError};

pub struct PromptApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response of `POST /prompt`.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptResponse {
    pub success: bool,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub music_style: Option<String>,
}

impl PromptApi {
    pub fn new(api_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    /// Turn a song description into a generation prompt.
    ///
    /// A `success: false` reply, or one without a prompt, is reported as
    /// [`HttpApiError::Unexpected`].
    pub async fn build_prompt(&self, inputs: &PromptInputs) -> Result<PromptResponse, HttpApiError> {
        let response = self
            .client
            .post(endpoint(&self.api_url, "prompt"))
            .json(inputs)
            .send()
            .await?;
        let parsed: PromptResponse = parse_response(response).await?;
        match &parsed.prompt {
            Some(p) if parsed.success && !p.trim().is_empty() => Ok(parsed),
            _ => Err(HttpApiError::Unexpected(
                "prompt builder reported failure".to_string(),
            )),
        }
    }
}
