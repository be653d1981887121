use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::lead::{ClientId, LeadId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub i64);

/// Local mirror of one external conversation, keyed by
/// `(client, external account, external chat id)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub client_id: ClientId,
    pub account_id: String,
    pub chat_id: String,
    /// Advisory link; the referenced lead may no longer exist and absence
    /// is not an error.
    pub lead_id: Option<LeadId>,
    pub attendee_name: Option<String>,
    pub attendee_url: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message_preview: Option<String>,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    /// A thread can only be used for sending when both external
    /// identifiers are present.
    pub fn has_gateway_identifiers(&self) -> bool {
        !self.account_id.trim().is_empty() && !self.chat_id.trim().is_empty()
    }
}
