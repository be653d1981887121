use chrono::{DateTime, Utc};
use serde_json::Value;

use leadflow_core::payload;

/// What the gateway tells us about a just-sent message. Every field is
/// optional; older gateway versions return a bare `{}` on success and the
/// caller must decide what a missing provider id means.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub provider_message_id: Option<String>,
    pub sender_url: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl SendReceipt {
    pub fn from_response(body: &Value) -> Self {
        Self {
            provider_message_id: payload::string_at(
                body,
                &["message_id", "id", "message.id", "data.message_id", "data.id"],
            ),
            sender_url: payload::string_at(
                body,
                &["sender_url", "sender.profile_url", "data.sender_url"],
            ),
            sent_at: payload::string_at(body, &["timestamp", "created_at", "message.timestamp"])
                .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
                .map(|timestamp| timestamp.with_timezone(&Utc)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::SendReceipt;

    #[test]
    fn reads_the_message_id_from_any_known_location() {
        for body in [
            json!({"message_id": "m-1"}),
            json!({"id": "m-1"}),
            json!({"message": {"id": "m-1"}}),
            json!({"data": {"message_id": "m-1"}}),
        ] {
            let receipt = SendReceipt::from_response(&body);
            assert_eq!(receipt.provider_message_id.as_deref(), Some("m-1"), "body: {body}");
        }
    }

    #[test]
    fn empty_response_yields_an_empty_receipt() {
        assert_eq!(SendReceipt::from_response(&json!({})), SendReceipt::default());
    }

    #[test]
    fn parses_the_send_timestamp_when_valid() {
        let receipt = SendReceipt::from_response(&json!({
            "message_id": "m-1",
            "timestamp": "2026-03-01T10:00:00Z",
        }));
        assert_eq!(
            receipt.sent_at.map(|at| at.to_rfc3339()),
            Some("2026-03-01T10:00:00+00:00".to_string()),
        );

        let garbled = SendReceipt::from_response(&json!({"timestamp": "yesterday"}));
        assert_eq!(garbled.sent_at, None);
    }
}
