//! Repository for the `variation_tasks` table.

use huggnote_core::types::{OrderId, SongIndex};
use huggnote_core::variation::{VariationBook, VariationId};
use sqlx::{PgConnection, PgPool};

use crate::models::variation_task::VariationTask;

const COLUMNS: &str = "task_id, order_id, song_index, variation_id, created_at";

/// Task id -> slot lookups for routing webhook deliveries.
pub struct VariationTaskRepo;

impl VariationTaskRepo {
    /// Index one task id. Re-indexing the same task is a no-op.
    pub async fn index(
        conn: &mut PgConnection,
        order_id: &OrderId,
        song_index: SongIndex,
        variation_id: VariationId,
        task_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO variation_tasks (task_id, order_id, song_index, variation_id) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (task_id) DO NOTHING",
        )
        .bind(task_id)
        .bind(order_id.as_str())
        .bind(i16::from(song_index))
        .bind(i16::from(variation_id.get()))
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Index every submitted task in `book`. Returns how many were written.
    pub async fn index_book(
        conn: &mut PgConnection,
        order_id: &OrderId,
        book: &VariationBook,
    ) -> Result<usize, sqlx::Error> {
        let mut count = 0;
        for (song, variation, task_id) in book.submitted_tasks() {
            Self::index(&mut *conn, order_id, song, variation, task_id).await?;
            count += 1;
        }
        Ok(count)
    }

    pub async fn find_by_task_id(
        pool: &PgPool,
        task_id: &str,
    ) -> Result<Option<VariationTask>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM variation_tasks WHERE task_id = $1");
        sqlx::query_as::<_, VariationTask>(&query)
            .bind(task_id)
            .fetch_optional(pool)
            .await
    }

    /// Remove a song's task index, ahead of a manual retry.
    pub async fn delete_for_song(
        conn: &mut PgConnection,
        order_id: &OrderId,
        song_index: SongIndex,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM variation_tasks WHERE order_id = $1 AND song_index = $2",
        )
        .bind(order_id.as_str())
        .bind(i16::from(song_index))
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}
