//! REST clients for the services an order depends on.
//!
//! Each client wraps one HTTP collaborator with [`reqwest`]: the prompt
//! builder, the music generation service, and the payment session service.
//! Non-2xx responses surface as [`HttpApiError::ApiError`] with the status
//! and raw body.

pub mod generate;
pub mod http;
pub mod payment;
pub mod prompt;

pub use generate::{GenerateRequest, GenerateResponse, MusicApi};
pub use http::HttpApiError;
pub use payment::{CheckoutRequest, CheckoutSession, PaymentApi};
pub use prompt::{PromptApi, PromptResponse};
