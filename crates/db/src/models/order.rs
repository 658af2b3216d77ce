//! Order record rows.

use huggnote_core::error::CoreError;
use huggnote_core::order::{OrderForm, OrderStatus};
use huggnote_core::prompt::PromptCache;
use huggnote_core::record::OrderRecord;
use huggnote_core::selection::Selections;
use huggnote_core::types::{OrderId, Timestamp};
use huggnote_core::variation::VariationBook;
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `orders` table.
#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub id: String,
    pub user_id: Option<String>,
    pub status: String,
    pub form: Json<OrderForm>,
    pub prompts: Json<PromptCache>,
    pub variations: Json<VariationBook>,
    pub selections: Json<Selections>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl OrderRow {
    pub fn into_record(self) -> Result<OrderRecord, CoreError> {
        let status = OrderStatus::parse(&self.status)
            .map_err(|e| CoreError::Corrupt {
                entity: "Order",
                id: self.id.clone(),
                reason: e.to_string(),
            })?;
        Ok(OrderRecord {
            id: OrderId::from(self.id),
            user_id: self.user_id,
            status,
            form: self.form.0,
            prompts: self.prompts.0,
            variations: self.variations.0,
            selections: self.selections.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
