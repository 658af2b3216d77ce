//! Order form types submitted by the customer, and their validation.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

/// Hard ceiling on songs in one order.
pub const MAX_SONGS_PER_ORDER: usize = 5;

/// One recipient/occasion description. Free text throughout; only the
/// recipient name is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SongSpec {
    #[validate(length(min = 1, message = "recipient name is required"))]
    pub recipient_name: String,
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(default)]
    pub occasion: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    /// Preferred vocal, e.g. `"female"`, `"male"`. Passed to the generator
    /// as the voice hint.
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub memories: Option<String>,
    #[serde(default)]
    pub extra: Option<String>,
}

/// Order-wide sender details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SenderInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[validate(email(message = "a valid sender email is required"))]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    /// Personal message from the sender. Feeds into every prompt.
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverySpeed {
    #[default]
    Standard,
    Express,
    Rush,
}

/// The complete multi-song form, as persisted in the order record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct OrderForm {
    #[validate(length(min = 1, max = 5, message = "an order holds between 1 and 5 songs"), nested)]
    pub songs: Vec<SongSpec>,
    #[validate(nested)]
    pub sender: SenderInfo,
    #[serde(default)]
    pub delivery: DeliverySpeed,
}

impl OrderForm {
    pub fn song_count(&self) -> usize {
        self.songs.len()
    }
}

/// Lifecycle of an order record on the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Draft,
    Generating,
    AwaitingPayment,
    Paid,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Generating => "generating",
            OrderStatus::AwaitingPayment => "awaiting_payment",
            OrderStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "draft" => Ok(OrderStatus::Draft),
            "generating" => Ok(OrderStatus::Generating),
            "awaiting_payment" => Ok(OrderStatus::AwaitingPayment),
            "paid" => Ok(OrderStatus::Paid),
            other => Err(CoreError::Validation(format!(
                "Unknown order status '{other}'"
            ))),
        }
    }

    /// Paid orders no longer accept patches.
    pub fn is_final(self) -> bool {
        matches!(self, OrderStatus::Paid)
    }
}

/// Validate a submitted form before it is persisted.
pub fn validate_order_form(form: &OrderForm) -> Result<(), CoreError> {
    form.validate()
        .map_err(|e| CoreError::Validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn song(name: &str) -> SongSpec {
        SongSpec {
            recipient_name: name.to_string(),
            ..Default::default()
        }
    }

    fn form(songs: Vec<SongSpec>) -> OrderForm {
        OrderForm {
            songs,
            sender: SenderInfo {
                email: "sam@example.com".to_string(),
                ..Default::default()
            },
            delivery: DeliverySpeed::Standard,
        }
    }

    #[test]
    fn valid_form_passes() {
        assert!(validate_order_form(&form(vec![song("Alex")])).is_ok());
    }

    #[test]
    fn empty_song_list_is_rejected() {
        assert_matches!(
            validate_order_form(&form(vec![])),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn six_songs_are_rejected() {
        let songs = (0..6).map(|i| song(&format!("R{i}"))).collect();
        assert_matches!(
            validate_order_form(&form(songs)),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn blank_recipient_is_rejected() {
        assert_matches!(
            validate_order_form(&form(vec![song("Alex"), song("")])),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn bad_email_is_rejected() {
        let mut f = form(vec![song("Alex")]);
        f.sender.email = "not-an-email".to_string();
        assert_matches!(validate_order_form(&f), Err(CoreError::Validation(_)));
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            OrderStatus::Draft,
            OrderStatus::Generating,
            OrderStatus::AwaitingPayment,
            OrderStatus::Paid,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(OrderStatus::parse("shipped").is_err());
    }

    #[test]
    fn delivery_defaults_when_missing() {
        let json = r#"{"songs":[{"recipient_name":"Kim"}],"sender":{"email":"a@b.co"}}"#;
        let parsed: OrderForm = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.delivery, DeliverySpeed::Standard);
        assert_eq!(parsed.songs[0].mood, None);
    }
}
