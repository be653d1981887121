use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use leadflow_core::payload;

/// Event tags the gateway has used for an accepted connection, across API
/// versions. Matching is exact after lowercasing.
const RELATION_TAGS: &[&str] = &["new_relation", "relation.created", "connection_accepted"];

const MESSAGE_TAGS: &[&str] = &["message_received", "new_message", "message.created"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookKind {
    Relation,
    Message,
    Unknown,
}

impl WebhookKind {
    pub fn classify(body: &Value) -> Self {
        let Some(tag) = event_tag(body) else {
            return Self::Unknown;
        };
        if RELATION_TAGS.contains(&tag.as_str()) {
            Self::Relation
        } else if MESSAGE_TAGS.contains(&tag.as_str()) {
            Self::Message
        } else {
            Self::Unknown
        }
    }
}

fn event_tag(body: &Value) -> Option<String> {
    payload::string_at(body, &["event", "type", "event_type", "name"])
        .map(|tag| tag.to_ascii_lowercase())
}

/// A connection-accepted delivery, reduced to the fields the reconciler
/// needs. Every field is optional because no two gateway versions agree
/// on where they live.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelationEvent {
    pub event_type: Option<String>,
    pub account_id: Option<String>,
    pub provider_member_id: Option<String>,
    pub profile_url: Option<String>,
    pub full_name: Option<String>,
    /// Local invitation row referenced by the delivery, when our own
    /// tracking id round-tripped through the gateway.
    pub invitation_id: Option<i64>,
}

impl RelationEvent {
    pub fn from_payload(body: &Value) -> Self {
        Self {
            event_type: event_tag(body),
            account_id: payload::string_at(body, &["account_id", "account.id"]),
            provider_member_id: payload::string_at(
                body,
                &[
                    "user_provider_id",
                    "provider_id",
                    "member_id",
                    "user.provider_id",
                    "data.provider_id",
                ],
            ),
            profile_url: payload::string_at(
                body,
                &["user_profile_url", "profile_url", "user.profile_url", "public_profile_url"],
            ),
            full_name: payload::string_at(body, &["user_full_name", "name", "user.name"]),
            invitation_id: payload::string_at(
                body,
                &["invitation_id", "metadata.invitation_id", "tracking_id"],
            )
            .and_then(|raw| raw.parse().ok()),
        }
    }

    pub fn is_new_relation(&self) -> bool {
        self.event_type.as_deref().is_some_and(|tag| RELATION_TAGS.contains(&tag))
    }
}

/// An inbound chat message delivery.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageEvent {
    pub account_id: Option<String>,
    pub chat_id: Option<String>,
    pub provider_message_id: Option<String>,
    pub sender_attendee_id: Option<String>,
    pub text: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl MessageEvent {
    pub fn from_payload(body: &Value) -> Self {
        Self {
            account_id: payload::string_at(body, &["account_id", "account.id"]),
            chat_id: payload::string_at(body, &["chat_id", "chat.id", "conversation_id"]),
            provider_message_id: payload::string_at(
                body,
                &["message_id", "id", "message.id", "data.message_id"],
            ),
            sender_attendee_id: payload::string_at(
                body,
                &["sender_attendee_id", "sender_id", "sender.attendee_id", "from.id"],
            ),
            text: payload::string_at(body, &["message", "text", "body", "message.text"]),
            sent_at: payload::string_at(body, &["timestamp", "created_at", "message.timestamp"])
                .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
                .map(|timestamp| timestamp.with_timezone(&Utc)),
        }
    }
}

/// Constant-shape shared-secret check performed before any payload is
/// parsed. A missing configured secret disables the check (development
/// setups); a configured secret requires an exact match.
pub fn secret_matches(provided: Option<&str>, expected: Option<&SecretString>) -> bool {
    match expected {
        None => true,
        Some(expected) => provided.is_some_and(|value| value == expected.expose_secret()),
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;

    use super::{secret_matches, MessageEvent, RelationEvent, WebhookKind};

    #[test]
    fn classifies_known_event_tags() {
        assert_eq!(WebhookKind::classify(&json!({"event": "new_relation"})), WebhookKind::Relation);
        assert_eq!(
            WebhookKind::classify(&json!({"type": "Connection_Accepted"})),
            WebhookKind::Relation,
        );
        assert_eq!(
            WebhookKind::classify(&json!({"event": "message_received"})),
            WebhookKind::Message,
        );
        assert_eq!(WebhookKind::classify(&json!({"event": "account_synced"})), WebhookKind::Unknown);
        assert_eq!(WebhookKind::classify(&json!({})), WebhookKind::Unknown);
    }

    #[test]
    fn relation_event_reads_versioned_field_locations() {
        let event = RelationEvent::from_payload(&json!({
            "event": "new_relation",
            "account_id": "acct-1",
            "user_provider_id": "prov-9",
            "user_profile_url": "https://www.linkedin.com/in/jane-doe/",
            "user_full_name": "Jane Doe",
            "invitation_id": "42",
        }));

        assert!(event.is_new_relation());
        assert_eq!(event.account_id.as_deref(), Some("acct-1"));
        assert_eq!(event.provider_member_id.as_deref(), Some("prov-9"));
        assert_eq!(event.profile_url.as_deref(), Some("https://www.linkedin.com/in/jane-doe/"));
        assert_eq!(event.invitation_id, Some(42));
    }

    #[test]
    fn relation_event_falls_back_to_nested_provider_id() {
        let event = RelationEvent::from_payload(&json!({
            "event": "relation.created",
            "user": {"provider_id": "prov-9"},
        }));
        assert_eq!(event.provider_member_id.as_deref(), Some("prov-9"));
    }

    #[test]
    fn non_relation_tags_are_rejected() {
        let event = RelationEvent::from_payload(&json!({"event": "message_received"}));
        assert!(!event.is_new_relation());
        assert!(!RelationEvent::default().is_new_relation());
    }

    #[test]
    fn message_event_extraction() {
        let event = MessageEvent::from_payload(&json!({
            "account_id": "acct-1",
            "chat": {"id": "chat-7"},
            "message_id": "m-1",
            "sender": {"attendee_id": "att-3"},
            "message": "hello",
            "timestamp": "2026-03-01T10:00:00Z",
        }));

        assert_eq!(event.chat_id.as_deref(), Some("chat-7"));
        assert_eq!(event.provider_message_id.as_deref(), Some("m-1"));
        assert_eq!(event.sender_attendee_id.as_deref(), Some("att-3"));
        assert_eq!(event.text.as_deref(), Some("hello"));
        assert!(event.sent_at.is_some());
    }

    #[test]
    fn secret_check_is_strict_only_when_configured() {
        assert!(secret_matches(None, None));
        assert!(secret_matches(Some("anything"), None));

        let expected = SecretString::from("hook-secret".to_string());
        assert!(secret_matches(Some("hook-secret"), Some(&expected)));
        assert!(!secret_matches(Some("wrong"), Some(&expected)));
        assert!(!secret_matches(None, Some(&expected)));
    }
}
