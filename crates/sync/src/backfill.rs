use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use leadflow_db::repositories::{InvitationRepository, RepositoryError};
use leadflow_unipile::RelationEvent;

use crate::reconciler::{ReconcileOutcome, Reconciler, RelationEventInput};

/// Per-outcome tallies for one backfill page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BackfillCounts {
    pub updated: u64,
    pub already_present: u64,
    pub lead_not_found: u64,
    pub client_not_found: u64,
    pub provider_id_missing: u64,
    pub mismatch_warning: u64,
    pub lead_update_failed: u64,
    /// Invitations whose stored payload is not a relation event (or not
    /// parseable JSON at all).
    pub skipped_non_relation: u64,
}

impl BackfillCounts {
    fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Updated => self.updated += 1,
            ReconcileOutcome::AlreadyPresent => self.already_present += 1,
            ReconcileOutcome::LeadNotFound => self.lead_not_found += 1,
            ReconcileOutcome::ClientNotFound => self.client_not_found += 1,
            ReconcileOutcome::ProviderIdMissing => self.provider_id_missing += 1,
            ReconcileOutcome::MismatchWarning => self.mismatch_warning += 1,
            ReconcileOutcome::LeadUpdateFailed => self.lead_update_failed += 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BackfillPage {
    /// Cursor for the next call. Advances to the last scanned row id even
    /// when nothing on the page was a relation event, so progress is
    /// monotonic and no page is re-scanned.
    pub next_cursor: i64,
    pub scanned: u64,
    pub has_more: bool,
    pub counts: BackfillCounts,
}

/// Replays stored invitation payloads through the reconciler, one
/// bounded page per call. The reconciler's replay safety is what makes
/// overlapping or repeated runs harmless.
#[derive(Clone)]
pub struct BackfillRunner {
    invitations: Arc<dyn InvitationRepository>,
    reconciler: Reconciler,
}

impl BackfillRunner {
    pub fn new(invitations: Arc<dyn InvitationRepository>, reconciler: Reconciler) -> Self {
        Self { invitations, reconciler }
    }

    pub async fn run(&self, cursor: i64, limit: u32) -> Result<BackfillPage, RepositoryError> {
        let rows = self.invitations.scan_after(cursor, limit).await?;
        let scanned = rows.len() as u64;
        // An empty page can never have more: a full page of `limit` rows is
        // the only continuation signal, and a zero limit must not report
        // one (callers loop on `has_more` with an unmoved cursor).
        let has_more = !rows.is_empty() && rows.len() == limit as usize;
        let mut next_cursor = cursor;
        let mut counts = BackfillCounts::default();

        for invitation in rows {
            next_cursor = invitation.id.0;

            let event = invitation
                .payload_json
                .as_deref()
                .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
                .map(|payload| RelationEvent::from_payload(&payload));
            let Some(event) = event.filter(RelationEvent::is_new_relation) else {
                counts.skipped_non_relation += 1;
                continue;
            };

            let input = RelationEventInput { event, lead_hint: invitation.lead_id };
            let report = self.reconciler.reconcile(&input).await?;
            counts.record(report.outcome);

            if report.outcome == ReconcileOutcome::LeadUpdateFailed {
                warn!(
                    event_name = "sync.backfill.lead_update_failed",
                    invitation_id = invitation.id.0,
                );
                self.invitations
                    .set_last_error(invitation.id, "provider id write failed during backfill")
                    .await?;
            }
        }

        info!(
            event_name = "sync.backfill.page_done",
            cursor,
            next_cursor,
            scanned,
            has_more,
            updated = counts.updated,
            skipped = counts.skipped_non_relation,
        );
        Ok(BackfillPage { next_cursor, scanned, has_more, counts })
    }
}
