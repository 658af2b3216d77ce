use axum::routing::post;
use axum::Router;

use crate::handlers::webhooks;
use crate::state::AppState;

/// Routes mounted at `/webhooks`.
///
/// ```text
/// POST /generation                          receive_generation_result
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/generation", post(webhooks::receive_generation_result))
}
