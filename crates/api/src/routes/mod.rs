pub mod health;
pub mod orders;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /orders                                   create (POST)
/// /orders/{id}                              get, merge-patch
/// /orders/{id}/songs/{index}/variations     reset one song (DELETE)
///
/// /users/{user_id}/orders                   library listing (GET)
///
/// /webhooks/generation                      generation results (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/orders", orders::router())
        .nest("/users", orders::user_router())
        .nest("/webhooks", webhooks::router())
}
