//! Repository for the `orders` table.

use huggnote_core::record::OrderRecord;
use huggnote_core::types::OrderId;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use crate::models::order::OrderRow;

/// Column list for `orders` queries.
const COLUMNS: &str = "\
    id, user_id, status, form, prompts, variations, selections, \
    created_at, updated_at";

/// Provides query operations for order records.
pub struct OrderRepo;

impl OrderRepo {
    /// Insert a fresh record, returning the stored row.
    ///
    /// A duplicate id surfaces as a unique violation on `orders_pkey`.
    pub async fn create(pool: &PgPool, record: &OrderRecord) -> Result<OrderRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO orders (id, user_id, status, form, prompts, variations, selections, \
                                 created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OrderRow>(&query)
            .bind(record.id.as_str())
            .bind(record.user_id.as_deref())
            .bind(record.status.as_str())
            .bind(Json(&record.form))
            .bind(Json(&record.prompts))
            .bind(Json(&record.variations))
            .bind(Json(&record.selections))
            .bind(record.created_at)
            .bind(record.updated_at)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: &OrderId) -> Result<Option<OrderRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM orders WHERE id = $1");
        sqlx::query_as::<_, OrderRow>(&query)
            .bind(id.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Load a record and hold its row lock until the transaction ends.
    pub async fn lock_by_id(
        conn: &mut PgConnection,
        id: &OrderId,
    ) -> Result<Option<OrderRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, OrderRow>(&query)
            .bind(id.as_str())
            .fetch_optional(conn)
            .await
    }

    /// Orders owned by a user, newest first.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<OrderRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM orders \
             WHERE user_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, OrderRow>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Write back every mutable column of an already-merged record.
    pub async fn save(conn: &mut PgConnection, record: &OrderRecord) -> Result<OrderRow, sqlx::Error> {
        let query = format!(
            "UPDATE orders \
             SET user_id = $2, status = $3, form = $4, prompts = $5, \
                 variations = $6, selections = $7, updated_at = $8 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OrderRow>(&query)
            .bind(record.id.as_str())
            .bind(record.user_id.as_deref())
            .bind(record.status.as_str())
            .bind(Json(&record.form))
            .bind(Json(&record.prompts))
            .bind(Json(&record.variations))
            .bind(Json(&record.selections))
            .bind(record.updated_at)
            .fetch_one(conn)
            .await
    }
}
