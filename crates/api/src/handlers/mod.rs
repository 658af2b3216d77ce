pub mod orders;
pub mod webhooks;
