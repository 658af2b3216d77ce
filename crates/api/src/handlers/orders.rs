//! Handlers for order records.
//!
//! The record is the synchronization point between browser sessions.
//! Patches never replace nested maps: they are merged into the stored
//! record under a row lock using [`OrderRecord::apply_patch`], so two tabs
//! saving at once cannot drop each other's task ids.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use huggnote_core::error::CoreError;
use huggnote_core::order::{validate_order_form, MAX_SONGS_PER_ORDER};
use huggnote_core::record::{NewOrder, OrderPatch, OrderRecord, RecordSummary};
use huggnote_core::types::{OrderId, SongIndex};
use huggnote_db::repositories::{OrderRepo, VariationTaskRepo};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Default page size for library listings.
const DEFAULT_LIST_LIMIT: i64 = 50;
/// Upper bound on page size for library listings.
const MAX_LIST_LIMIT: i64 = 100;

/// Query parameters for `GET /users/{user_id}/orders`.
#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn not_found(id: &OrderId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Order",
        id: id.to_string(),
    })
}

/// POST /api/v1/orders
///
/// Creates a draft record with the client-generated id. A duplicate id is
/// a 409.
pub async fn create_order(
    State(state): State<AppState>,
    Json(input): Json<NewOrder>,
) -> AppResult<impl IntoResponse> {
    if input.id.as_str().trim().is_empty() {
        return Err(AppError::BadRequest("order id must not be empty".into()));
    }
    validate_order_form(&input.form)?;

    let mut record = OrderRecord::new(input.id, input.form, chrono::Utc::now());
    record.user_id = input.user_id;

    let row = OrderRepo::create(&state.pool, &record).await?;
    let record = row.into_record()?;

    tracing::info!(
        order_id = %record.id,
        songs = record.song_count(),
        "Order record created",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: record })))
}

/// GET /api/v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = OrderId::from(id);
    let row = OrderRepo::find_by_id(&state.pool, &id)
        .await?
        .ok_or_else(|| not_found(&id))?;
    Ok(Json(DataResponse {
        data: row.into_record()?,
    }))
}

/// PATCH /api/v1/orders/{id}
///
/// Merges the patch into the stored record and indexes any newly
/// submitted task ids for webhook routing.
pub async fn patch_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<OrderPatch>,
) -> AppResult<impl IntoResponse> {
    let id = OrderId::from(id);
    if let Some(form) = &patch.form {
        validate_order_form(form)?;
    }

    let mut tx = state.pool.begin().await?;
    let mut record = OrderRepo::lock_by_id(&mut tx, &id)
        .await?
        .ok_or_else(|| not_found(&id))?
        .into_record()?;

    record.apply_patch(&patch, chrono::Utc::now())?;
    let saved = OrderRepo::save(&mut tx, &record).await?.into_record()?;
    let indexed = VariationTaskRepo::index_book(&mut tx, &id, &saved.variations).await?;
    tx.commit().await?;

    tracing::debug!(order_id = %id, indexed, "Order record patched");

    Ok(Json(DataResponse { data: saved }))
}

/// DELETE /api/v1/orders/{id}/songs/{index}/variations
///
/// Clears one song's variation slots, selection and task index so a
/// manual retry can generate from scratch.
pub async fn reset_song_variations(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, SongIndex)>,
) -> AppResult<impl IntoResponse> {
    if usize::from(index) >= MAX_SONGS_PER_ORDER {
        return Err(CoreError::SongOutOfRange(index).into());
    }
    let id = OrderId::from(id);

    let mut tx = state.pool.begin().await?;
    let mut record = OrderRepo::lock_by_id(&mut tx, &id)
        .await?
        .ok_or_else(|| not_found(&id))?
        .into_record()?;

    record.reset_song(index, chrono::Utc::now())?;
    let saved = OrderRepo::save(&mut tx, &record).await?.into_record()?;
    let removed = VariationTaskRepo::delete_for_song(&mut tx, &id, index).await?;
    tx.commit().await?;

    tracing::info!(order_id = %id, song_index = index, removed, "Song variations reset");

    Ok(Json(DataResponse { data: saved }))
}

/// GET /api/v1/users/{user_id}/orders
///
/// Library listing for a signed-in user, newest first.
pub async fn list_user_orders(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<ListOrdersQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let rows = OrderRepo::list_by_user(&state.pool, &user_id, limit, offset).await?;
    let summaries = rows
        .into_iter()
        .map(|row| row.into_record().map(|r| r.summary()))
        .collect::<Result<Vec<RecordSummary>, CoreError>>()?;

    Ok(Json(DataResponse { data: summaries }))
}
