//! Generation-result webhook.
//!
//! The generation service posts one delivery per task id, possibly several
//! times as lyrics and then audio become available. Each delivery is
//! routed through the `variation_tasks` index to its slot and merged into
//! the record, where the client's completion watcher picks it up.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use huggnote_core::error::CoreError;
use huggnote_core::record::OrderPatch;
use huggnote_core::types::{OrderId, SongIndex};
use huggnote_core::variation::{VariationBook, VariationId, VariationSlot};
use huggnote_core::webhook::{verify_webhook_signature, GenerationResult, SIGNATURE_HEADER};
use huggnote_db::repositories::{OrderRepo, VariationTaskRepo};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Acknowledgement returned to the generation service.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub order_id: OrderId,
    pub song_index: SongIndex,
    pub variation_id: VariationId,
    /// Whether the slot now has audio.
    pub ready: bool,
}

/// POST /api/v1/webhooks/generation
pub async fn receive_generation_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    if let Some(secret) = &state.config.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_webhook_signature(secret, &body, signature) {
            tracing::warn!("Rejected generation webhook with bad signature");
            return Err(AppError::BadSignature);
        }
    }

    let result: GenerationResult = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid webhook payload: {e}")))?;

    let task = VariationTaskRepo::find_by_task_id(&state.pool, &result.task_id)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::NotFound {
                entity: "Task",
                id: result.task_id.clone(),
            })
        })?;
    let (song_index, variation_id) = task.slot()?;
    let order_id = OrderId::from(task.order_id);

    if !result.has_content() {
        tracing::debug!(
            task_id = %result.task_id,
            status = ?result.status,
            "Generation webhook without content",
        );
        return Ok(Json(DataResponse {
            data: WebhookAck {
                order_id,
                song_index,
                variation_id,
                ready: false,
            },
        }));
    }

    let mut book = VariationBook::default();
    book.song_mut(song_index).slot_mut(variation_id).merge(&VariationSlot {
        audio_url: result.audio_url.clone(),
        lyrics: result.lyrics.clone(),
        ..Default::default()
    });
    let patch = OrderPatch {
        variations: Some(book),
        ..Default::default()
    };

    let mut tx = state.pool.begin().await?;
    let mut record = OrderRepo::lock_by_id(&mut tx, &order_id)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::NotFound {
                entity: "Order",
                id: order_id.to_string(),
            })
        })?
        .into_record()?;
    record.apply_patch(&patch, chrono::Utc::now())?;
    OrderRepo::save(&mut tx, &record).await?;
    tx.commit().await?;

    let ready = record
        .variations
        .song(song_index)
        .and_then(|song| song.get(variation_id))
        .is_some_and(VariationSlot::is_ready);

    tracing::info!(
        order_id = %order_id,
        song_index,
        variation_id = %variation_id,
        task_id = %result.task_id,
        ready,
        "Generation result stored",
    );

    Ok(Json(DataResponse {
        data: WebhookAck {
            order_id,
            song_index,
            variation_id,
            ready,
        },
    }))
}
