//! Route definitions for order records.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::orders;
use crate::state::AppState;

/// Routes mounted at `/orders`.
///
/// ```text
/// POST   /                                  create_order
/// GET    /{id}                              get_order
/// PATCH  /{id}                              patch_order
/// DELETE /{id}/songs/{index}/variations     reset_song_variations
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(orders::create_order))
        .route("/{id}", get(orders::get_order).patch(orders::patch_order))
        .route(
            "/{id}/songs/{index}/variations",
            delete(orders::reset_song_variations),
        )
}

/// Routes mounted at `/users`.
///
/// ```text
/// GET /{user_id}/orders                     list_user_orders
/// ```
pub fn user_router() -> Router<AppState> {
    Router::new().route("/{user_id}/orders", get(orders::list_user_orders))
}
