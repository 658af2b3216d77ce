//! Collaborator seams.
//!
//! Each external service the workflow consumes sits behind a trait so the
//! controller can run against the `huggnote-musicgen` clients in production
//! and against in-memory fakes in tests.

use async_trait::async_trait;
use huggnote_core::prompt::PromptInputs;
use huggnote_musicgen::{
    CheckoutRequest, CheckoutSession, GenerateRequest, HttpApiError, MusicApi, PaymentApi,
    PromptApi, PromptResponse,
};

#[async_trait]
pub trait PromptBuilder: Send + Sync {
    async fn build_prompt(&self, inputs: &PromptInputs) -> Result<PromptResponse, HttpApiError>;
}

/// Renders one variation; returns the task id used to correlate results.
#[async_trait]
pub trait VariationGenerator: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, HttpApiError>;
}

#[async_trait]
pub trait PaymentSessions: Send + Sync {
    async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, HttpApiError>;
}

/// Supplies the signed-in user, if any.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Option<String>;
}

#[async_trait]
impl PromptBuilder for PromptApi {
    async fn build_prompt(&self, inputs: &PromptInputs) -> Result<PromptResponse, HttpApiError> {
        PromptApi::build_prompt(self, inputs).await
    }
}

#[async_trait]
impl VariationGenerator for MusicApi {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, HttpApiError> {
        Ok(MusicApi::generate(self, request).await?.task_id)
    }
}

#[async_trait]
impl PaymentSessions for PaymentApi {
    async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, HttpApiError> {
        PaymentApi::create_session(self, request).await
    }
}

/// Identity fixed at startup, e.g. from `HUGGNOTE_USER_ID`.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(pub Option<String>);

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Option<String> {
        self.0.clone()
    }
}
