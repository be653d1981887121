use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use leadflow_core::domain::invitation::{DmDraftStatus, Invitation, InvitationId, InvitationStatus};
use leadflow_core::domain::lead::{ClientId, LeadId};

use super::{
    parse_optional_timestamp, parse_timestamp, InvitationRepository, RepositoryError,
};
use crate::DbPool;

const INVITATION_COLUMNS: &str = "id, client_id, lead_id, account_id, status, sent_at,
    accepted_at, dm_draft_status, last_error, payload_json, created_at, updated_at";

pub struct SqlInvitationRepository {
    pool: DbPool,
}

impl SqlInvitationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl InvitationRepository for SqlInvitationRepository {
    async fn find_by_id(&self, id: InvitationId) -> Result<Option<Invitation>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = ?"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(invitation_from_row).transpose()
    }

    async fn scan_after(
        &self,
        cursor: i64,
        limit: u32,
    ) -> Result<Vec<Invitation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id > ? ORDER BY id ASC LIMIT ?"
        ))
        .bind(cursor)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(invitation_from_row).collect()
    }

    async fn save(&self, invitation: Invitation) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO invitations (
                id, client_id, lead_id, account_id, status, sent_at, accepted_at,
                dm_draft_status, last_error, payload_json, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                lead_id = excluded.lead_id,
                status = excluded.status,
                sent_at = excluded.sent_at,
                accepted_at = excluded.accepted_at,
                dm_draft_status = excluded.dm_draft_status,
                last_error = excluded.last_error,
                payload_json = excluded.payload_json,
                updated_at = excluded.updated_at",
        )
        .bind(invitation.id.0)
        .bind(invitation.client_id.0)
        .bind(invitation.lead_id.map(|id| id.0))
        .bind(&invitation.account_id)
        .bind(invitation.status.as_str())
        .bind(invitation.sent_at.map(|value| value.to_rfc3339()))
        .bind(invitation.accepted_at.map(|value| value.to_rfc3339()))
        .bind(invitation.dm_draft_status.as_str())
        .bind(invitation.last_error.as_deref())
        .bind(invitation.payload_json.as_deref())
        .bind(invitation.created_at.to_rfc3339())
        .bind(invitation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_accepted(
        &self,
        id: InvitationId,
        accepted_at: DateTime<Utc>,
        payload_json: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE invitations
             SET status = 'accepted',
                 accepted_at = COALESCE(accepted_at, ?),
                 payload_json = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(accepted_at.to_rfc3339())
        .bind(payload_json)
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_last_error(&self, id: InvitationId, error: &str) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE invitations SET last_error = ?, updated_at = ? WHERE id = ?")
            .bind(error)
            .bind(Utc::now().to_rfc3339())
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn advance_dm_draft_status(
        &self,
        id: InvitationId,
        next: DmDraftStatus,
    ) -> Result<(), RepositoryError> {
        let Some(current) = self.find_by_id(id).await? else {
            return Ok(());
        };
        if !current.dm_draft_status.can_transition_to(next) {
            return Ok(());
        }

        sqlx::query("UPDATE invitations SET dm_draft_status = ?, updated_at = ? WHERE id = ?")
            .bind(next.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn invitation_from_row(row: SqliteRow) -> Result<Invitation, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = InvitationStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown invitation status `{status_raw}`"))
    })?;
    let draft_raw = row.try_get::<String, _>("dm_draft_status")?;
    let dm_draft_status = DmDraftStatus::parse(&draft_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown dm draft status `{draft_raw}`"))
    })?;

    Ok(Invitation {
        id: InvitationId(row.try_get("id")?),
        client_id: ClientId(row.try_get("client_id")?),
        lead_id: row.try_get::<Option<i64>, _>("lead_id")?.map(LeadId),
        account_id: row.try_get("account_id")?,
        status,
        sent_at: parse_optional_timestamp("sent_at", row.try_get("sent_at")?)?,
        accepted_at: parse_optional_timestamp("accepted_at", row.try_get("accepted_at")?)?,
        dm_draft_status,
        last_error: row.try_get("last_error")?,
        payload_json: row.try_get("payload_json")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use leadflow_core::domain::invitation::{
        DmDraftStatus, Invitation, InvitationId, InvitationStatus,
    };
    use leadflow_core::domain::lead::{ClientId, LeadId};

    use super::SqlInvitationRepository;
    use crate::repositories::InvitationRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        sqlx::query(
            "INSERT INTO clients (id, name, unipile_account_id, created_at)
             VALUES (1, 'Acme Outreach', 'acct-1', '2026-03-01T08:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert client");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn sample_invitation(id: i64) -> Invitation {
        Invitation {
            id: InvitationId(id),
            client_id: ClientId(1),
            lead_id: Some(LeadId(10)),
            account_id: "acct-1".to_string(),
            status: InvitationStatus::Sent,
            sent_at: Some(parse_ts("2026-03-01T09:00:00Z")),
            accepted_at: None,
            dm_draft_status: DmDraftStatus::None,
            last_error: None,
            payload_json: None,
            created_at: parse_ts("2026-03-01T08:30:00Z"),
            updated_at: parse_ts("2026-03-01T09:00:00Z"),
        }
    }

    #[tokio::test]
    async fn save_and_find_round_trip() {
        let pool = setup_pool().await;
        let repo = SqlInvitationRepository::new(pool.clone());
        let invitation = sample_invitation(1);

        repo.save(invitation.clone()).await.expect("save");
        let found = repo.find_by_id(invitation.id).await.expect("find");
        assert_eq!(found, Some(invitation));

        pool.close().await;
    }

    #[tokio::test]
    async fn scan_after_is_ascending_and_tolerates_gaps() {
        let pool = setup_pool().await;
        let repo = SqlInvitationRepository::new(pool.clone());
        for id in [3, 7, 20] {
            repo.save(sample_invitation(id)).await.expect("save");
        }

        let page = repo.scan_after(3, 10).await.expect("scan");
        let ids: Vec<i64> = page.iter().map(|invitation| invitation.id.0).collect();
        assert_eq!(ids, vec![7, 20]);

        let limited = repo.scan_after(0, 2).await.expect("scan limited");
        assert_eq!(limited.len(), 2);
        assert_eq!(limited.last().map(|invitation| invitation.id.0), Some(7));

        pool.close().await;
    }

    #[tokio::test]
    async fn mark_accepted_keeps_first_timestamp() {
        let pool = setup_pool().await;
        let repo = SqlInvitationRepository::new(pool.clone());
        repo.save(sample_invitation(1)).await.expect("save");

        let first = parse_ts("2026-03-02T10:00:00Z");
        let replay = parse_ts("2026-03-03T10:00:00Z");
        repo.mark_accepted(InvitationId(1), first, "{}").await.expect("accept");
        repo.mark_accepted(InvitationId(1), replay, "{}").await.expect("replay");

        let stored = repo.find_by_id(InvitationId(1)).await.expect("find").expect("present");
        assert_eq!(stored.status, InvitationStatus::Accepted);
        assert_eq!(stored.accepted_at, Some(first));

        pool.close().await;
    }

    #[tokio::test]
    async fn dm_draft_status_cannot_regress() {
        let pool = setup_pool().await;
        let repo = SqlInvitationRepository::new(pool.clone());
        repo.save(sample_invitation(1)).await.expect("save");

        repo.advance_dm_draft_status(InvitationId(1), DmDraftStatus::Sent)
            .await
            .expect("advance to sent");
        repo.advance_dm_draft_status(InvitationId(1), DmDraftStatus::Draft)
            .await
            .expect("regression attempt");

        let stored = repo.find_by_id(InvitationId(1)).await.expect("find").expect("present");
        assert_eq!(stored.dm_draft_status, DmDraftStatus::Sent);

        pool.close().await;
    }
}
