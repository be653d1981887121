use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use leadflow_core::canonical::canonicalize_profile_url;
use leadflow_core::domain::lead::{ClientId, Lead, LeadId};
use leadflow_db::repositories::{ClientRepository, LeadRepository, RepositoryError};
use leadflow_unipile::RelationEvent;

/// Terminal result of reconciling one connection-accepted event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Updated,
    AlreadyPresent,
    LeadNotFound,
    ClientNotFound,
    ProviderIdMissing,
    MismatchWarning,
    LeadUpdateFailed,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::AlreadyPresent => "already_present",
            Self::LeadNotFound => "lead_not_found",
            Self::ClientNotFound => "client_not_found",
            Self::ProviderIdMissing => "provider_id_missing",
            Self::MismatchWarning => "mismatch_warning",
            Self::LeadUpdateFailed => "lead_update_failed",
        }
    }
}

/// One event handed to the reconciler: the extracted delivery plus the
/// lead hint from the owning invitation row, when one exists.
#[derive(Clone, Debug)]
pub struct RelationEventInput {
    pub event: RelationEvent,
    pub lead_hint: Option<LeadId>,
}

/// Both identity signals are kept on the report so callers can act on a
/// hint disagreement instead of losing it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub outcome: ReconcileOutcome,
    pub matched_lead_id: Option<LeadId>,
    pub hinted_lead_id: Option<LeadId>,
    pub provider_member_id: Option<String>,
}

impl ReconcileReport {
    fn terminal(outcome: ReconcileOutcome, input: &RelationEventInput) -> Self {
        Self {
            outcome,
            matched_lead_id: None,
            hinted_lead_id: input.lead_hint,
            provider_member_id: input.event.provider_member_id.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Reconciler {
    clients: Arc<dyn ClientRepository>,
    leads: Arc<dyn LeadRepository>,
}

impl Reconciler {
    pub fn new(clients: Arc<dyn ClientRepository>, leads: Arc<dyn LeadRepository>) -> Self {
        Self { clients, leads }
    }

    /// Attaches the event's provider member id to the matching lead.
    /// Safe to call any number of times for the same event; a replay
    /// resolves to `AlreadyPresent`.
    pub async fn reconcile(
        &self,
        input: &RelationEventInput,
    ) -> Result<ReconcileReport, RepositoryError> {
        let Some(provider_member_id) = input.event.provider_member_id.clone() else {
            return Ok(ReconcileReport::terminal(ReconcileOutcome::ProviderIdMissing, input));
        };

        let client = match &input.event.account_id {
            Some(account_id) => self.clients.find_by_account(account_id).await?,
            None => None,
        };
        let Some(client) = client else {
            return Ok(ReconcileReport::terminal(ReconcileOutcome::ClientNotFound, input));
        };

        let canonical = canonicalize_profile_url(input.event.profile_url.as_deref());
        let mut mismatch = false;
        let matched = match &canonical {
            Some(key) => {
                let direct = self.leads.find_by_canonical_url(client.id, key).await?;
                match direct {
                    Some(lead) => {
                        if input.lead_hint.is_some_and(|hint| hint != lead.id) {
                            mismatch = true;
                        }
                        Some(lead)
                    }
                    // No stored key matched. The hinted lead may simply
                    // predate the matching-key column; confirm it against
                    // the event URL before trusting it.
                    None => {
                        self.hinted_lead_confirmed_by_url(client.id, input.lead_hint, key).await?
                    }
                }
            }
            // Without a usable URL the invitation hint is the only
            // identity signal left.
            None => self.hinted_lead(client.id, input.lead_hint).await?,
        };
        let Some(matched) = matched else {
            return Ok(ReconcileReport::terminal(ReconcileOutcome::LeadNotFound, input));
        };

        if matched.provider_member_id.as_deref() == Some(provider_member_id.as_str()) {
            return Ok(ReconcileReport {
                outcome: ReconcileOutcome::AlreadyPresent,
                matched_lead_id: Some(matched.id),
                hinted_lead_id: input.lead_hint,
                provider_member_id: Some(provider_member_id),
            });
        }

        // URL identity stays authoritative on a hint disagreement; the
        // write proceeds and the disagreement is reported.
        let written = match self.leads.set_provider_member_id(matched.id, &provider_member_id).await
        {
            Ok(written) => written,
            Err(error) => {
                warn!(
                    event_name = "sync.reconcile.lead_update_failed",
                    lead_id = matched.id.0,
                    error = %error,
                );
                false
            }
        };
        if !written {
            return Ok(ReconcileReport {
                outcome: ReconcileOutcome::LeadUpdateFailed,
                matched_lead_id: Some(matched.id),
                hinted_lead_id: input.lead_hint,
                provider_member_id: Some(provider_member_id),
            });
        }

        let outcome =
            if mismatch { ReconcileOutcome::MismatchWarning } else { ReconcileOutcome::Updated };
        info!(
            event_name = "sync.reconcile.provider_id_attached",
            lead_id = matched.id.0,
            outcome = outcome.as_str(),
        );
        Ok(ReconcileReport {
            outcome,
            matched_lead_id: Some(matched.id),
            hinted_lead_id: input.lead_hint,
            provider_member_id: Some(provider_member_id),
        })
    }

    /// Loads the hinted lead, discarding hints that point outside the
    /// event's client. Invitation ids round-trip through the gateway as
    /// opaque strings, so a hint is untrusted input until the owning
    /// client checks out.
    async fn hinted_lead(
        &self,
        client_id: ClientId,
        hint: Option<LeadId>,
    ) -> Result<Option<Lead>, RepositoryError> {
        let Some(hint) = hint else {
            return Ok(None);
        };
        Ok(self.leads.find_by_id(hint).await?.filter(|lead| lead.client_id == client_id))
    }

    /// Accepts the hinted lead only when its own profile URL canonicalizes
    /// to the event's matching key. A confirmed lead that predates the
    /// stored key gets the key written back for future direct lookups.
    async fn hinted_lead_confirmed_by_url(
        &self,
        client_id: ClientId,
        hint: Option<LeadId>,
        key: &str,
    ) -> Result<Option<Lead>, RepositoryError> {
        let Some(lead) = self.hinted_lead(client_id, hint).await? else {
            return Ok(None);
        };

        let lead_key = lead
            .canonical_url
            .clone()
            .or_else(|| canonicalize_profile_url(lead.linkedin_url.as_deref()));
        if lead_key.as_deref() != Some(key) {
            return Ok(None);
        }

        if lead.canonical_url.is_none() {
            self.leads.set_canonical_url(lead.id, key).await?;
        }
        Ok(Some(lead))
    }
}
