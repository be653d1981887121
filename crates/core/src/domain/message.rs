use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::lead::ClientId;
use crate::domain::thread::ThreadId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

impl MessageDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inbound" => Some(Self::Inbound),
            "outbound" => Some(Self::Outbound),
            _ => None,
        }
    }
}

/// One mirrored message. Immutable once inserted; the unique key
/// `(client, account, provider message id)` is the dedup authority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub client_id: ClientId,
    pub account_id: String,
    pub provider_message_id: String,
    pub thread_id: ThreadId,
    pub direction: MessageDirection,
    /// Nullable; backfilled later by attendee resolution, fill-if-empty only.
    pub sender_name: Option<String>,
    pub sender_url: Option<String>,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub payload_json: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for the messages table; the store assigns the row id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMessage {
    pub client_id: ClientId,
    pub account_id: String,
    pub provider_message_id: String,
    pub thread_id: ThreadId,
    pub direction: MessageDirection,
    pub sender_name: Option<String>,
    pub sender_url: Option<String>,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub payload_json: Option<String>,
}
