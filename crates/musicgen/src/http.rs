//! Response handling shared by every client, including the order record
//! client in the orchestrator.

/// Errors from the REST client layer.
#[derive(Debug, thiserror::Error)]
pub enum HttpApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose payload reported failure or lacked a field.
    #[error("Unexpected response: {0}")]
    Unexpected(String),
}

impl HttpApiError {
    /// The service asked us to slow down (HTTP 429).
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, HttpApiError::ApiError { status: 429, .. })
    }

    /// HTTP status if the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpApiError::ApiError { status, .. } => Some(*status),
            HttpApiError::Request(e) => e.status().map(|s| s.as_u16()),
            HttpApiError::Unexpected(_) => None,
        }
    }
}

/// Ensure the response has a success status code. Returns the response
/// unchanged on success, or an [`HttpApiError::ApiError`] containing the
/// status and body text on failure.
pub async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, HttpApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(HttpApiError::ApiError {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Parse a successful JSON response body into the expected type.
pub async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, HttpApiError> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}

/// Join a base URL and a path without doubling or dropping the slash.
pub fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
