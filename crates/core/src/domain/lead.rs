use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Linkedin,
    Maps,
}

impl LeadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linkedin => "linkedin",
            Self::Maps => "maps",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "linkedin" => Some(Self::Linkedin),
            "maps" => Some(Self::Maps),
            _ => None,
        }
    }
}

/// A prospect record from either ingestion source. Owned by the ingestion
/// pipeline; this engine only attaches the provider member id and updates
/// message-sent bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub client_id: ClientId,
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Source-provided free-form URL; never used for matching directly.
    pub linkedin_url: Option<String>,
    /// Derived matching key. `None` either because the raw URL does not
    /// canonicalize or because the backing column does not exist yet.
    pub canonical_url: Option<String>,
    pub source: LeadSource,
    pub provider_member_id: Option<String>,
    pub message_sent: bool,
    pub treated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
