use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::lead::ClientId;

/// Owning tenant. Authentication and billing live elsewhere; this engine
/// only needs the identity and the gateway account linkage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub unipile_account_id: String,
    pub created_at: DateTime<Utc>,
}
