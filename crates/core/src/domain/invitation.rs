use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::lead::{ClientId, LeadId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvitationId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Queued,
    Pending,
    Sent,
    Accepted,
    Connected,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Accepted => "accepted",
            Self::Connected => "connected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "accepted" => Some(Self::Accepted),
            "connected" => Some(Self::Connected),
            _ => None,
        }
    }
}

/// Lifecycle of the automated follow-up message drafted after a connection
/// is accepted. Only moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmDraftStatus {
    None,
    Draft,
    Sent,
}

impl DmDraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Draft => "draft",
            Self::Sent => "sent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "draft" => Some(Self::Draft),
            "sent" => Some(Self::Sent),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Draft => 1,
            Self::Sent => 2,
        }
    }

    /// `none → draft → sent`; regressions are rejected at the domain layer
    /// so replayed webhooks cannot undo a sent draft.
    pub fn can_transition_to(&self, next: DmDraftStatus) -> bool {
        next.rank() >= self.rank()
    }
}

/// One row per outbound connection request or inbound relation webhook.
/// Mutated on every webhook delivery and on provider-id backfill; never
/// deleted by this engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub client_id: ClientId,
    /// May point at a lead that was deleted later; always re-checked.
    pub lead_id: Option<LeadId>,
    pub account_id: String,
    pub status: InvitationStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub dm_draft_status: DmDraftStatus,
    pub last_error: Option<String>,
    /// Raw webhook payload, schema-unstable JSON stored verbatim.
    pub payload_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
