use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::warn;

use leadflow_core::domain::lead::{ClientId, Lead, LeadId, LeadSource};

use super::{is_missing_column_error, parse_timestamp, LeadRepository, RepositoryError};
use crate::DbPool;

const LEAD_COLUMNS_FULL: &str = "id, client_id, full_name, company, email, phone, linkedin_url,
    canonical_url, source, provider_member_id, message_sent, treated, created_at, updated_at";

/// Column list for databases where the canonical-url migration has not run
/// yet; the field is surfaced as NULL downstream.
const LEAD_COLUMNS_NARROW: &str = "id, client_id, full_name, company, email, phone, linkedin_url,
    NULL AS canonical_url, source, provider_member_id, message_sent, treated, created_at,
    updated_at";

pub struct SqlLeadRepository {
    pool: DbPool,
}

impl SqlLeadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LeadRepository for SqlLeadRepository {
    async fn find_by_id(&self, id: LeadId) -> Result<Option<Lead>, RepositoryError> {
        let full = sqlx::query(&format!("SELECT {LEAD_COLUMNS_FULL} FROM leads WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await;

        let row = match full {
            Ok(row) => row,
            Err(error) if is_missing_column_error(&error) => {
                warn!(
                    event_name = "db.leads.schema_fallback",
                    lead_id = id.0,
                    "canonical_url column absent, retrying with narrowed column list"
                );
                sqlx::query(&format!("SELECT {LEAD_COLUMNS_NARROW} FROM leads WHERE id = ?"))
                    .bind(id.0)
                    .fetch_optional(&self.pool)
                    .await?
            }
            Err(error) => return Err(error.into()),
        };

        row.map(lead_from_row).transpose()
    }

    async fn find_by_canonical_url(
        &self,
        client_id: ClientId,
        canonical_url: &str,
    ) -> Result<Option<Lead>, RepositoryError> {
        let result = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS_FULL} FROM leads WHERE client_id = ? AND canonical_url = ?"
        ))
        .bind(client_id.0)
        .bind(canonical_url)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(row) => row.map(lead_from_row).transpose(),
            // Without the column no lead can match; the caller sees a
            // plain miss rather than an error.
            Err(error) if is_missing_column_error(&error) => {
                warn!(
                    event_name = "db.leads.schema_fallback",
                    client_id = client_id.0,
                    "canonical_url column absent, canonical lookup degraded to no-match"
                );
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn set_provider_member_id(
        &self,
        id: LeadId,
        provider_member_id: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE leads SET provider_member_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(provider_member_id)
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_canonical_url(
        &self,
        id: LeadId,
        canonical_url: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE leads SET canonical_url = ?, updated_at = ? WHERE id = ?",
        )
        .bind(canonical_url)
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_missing_column_error(&error) => {
                warn!(
                    event_name = "db.leads.schema_fallback",
                    lead_id = id.0,
                    "canonical_url column absent, skipping matching-key write"
                );
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn mark_message_sent(&self, id: LeadId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE leads SET message_sent = 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn lead_from_row(row: SqliteRow) -> Result<Lead, RepositoryError> {
    let source_raw = row.try_get::<String, _>("source")?;
    let source = LeadSource::parse(&source_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown lead source `{source_raw}`")))?;

    Ok(Lead {
        id: LeadId(row.try_get("id")?),
        client_id: ClientId(row.try_get("client_id")?),
        full_name: row.try_get("full_name")?,
        company: row.try_get("company")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        linkedin_url: row.try_get("linkedin_url")?,
        canonical_url: row.try_get("canonical_url")?,
        source,
        provider_member_id: row.try_get("provider_member_id")?,
        message_sent: row.try_get::<i64, _>("message_sent")? != 0,
        treated: row.try_get::<i64, _>("treated")? != 0,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use leadflow_core::domain::lead::{ClientId, LeadId};

    use super::SqlLeadRepository;
    use crate::repositories::LeadRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn insert_client(pool: &DbPool) -> ClientId {
        sqlx::query(
            "INSERT INTO clients (id, name, unipile_account_id, created_at)
             VALUES (1, 'Acme Outreach', 'acct-1', '2026-03-01T08:00:00Z')",
        )
        .execute(pool)
        .await
        .expect("insert client");
        ClientId(1)
    }

    async fn insert_lead(pool: &DbPool, id: i64, canonical_url: Option<&str>) -> LeadId {
        sqlx::query(
            "INSERT INTO leads (id, client_id, full_name, linkedin_url, canonical_url, source,
                                message_sent, treated, created_at, updated_at)
             VALUES (?, 1, 'John Smith', 'linkedin.com/in/John-Smith?trk=abc', ?, 'linkedin',
                     0, 0, '2026-03-01T08:00:00Z', '2026-03-01T08:00:00Z')",
        )
        .bind(id)
        .bind(canonical_url)
        .execute(pool)
        .await
        .expect("insert lead");
        LeadId(id)
    }

    #[tokio::test]
    async fn finds_lead_by_canonical_url_scoped_to_client() {
        let pool = setup_pool().await;
        let client_id = insert_client(&pool).await;
        let lead_id = insert_lead(&pool, 10, Some("https://linkedin.com/in/john-smith")).await;

        let repo = SqlLeadRepository::new(pool.clone());
        let found = repo
            .find_by_canonical_url(client_id, "https://linkedin.com/in/john-smith")
            .await
            .expect("lookup");
        assert_eq!(found.map(|lead| lead.id), Some(lead_id));

        let miss = repo
            .find_by_canonical_url(ClientId(99), "https://linkedin.com/in/john-smith")
            .await
            .expect("lookup other client");
        assert!(miss.is_none());

        pool.close().await;
    }

    #[tokio::test]
    async fn provider_member_id_write_reports_missing_rows() {
        let pool = setup_pool().await;
        insert_client(&pool).await;
        let lead_id = insert_lead(&pool, 11, None).await;

        let repo = SqlLeadRepository::new(pool.clone());
        assert!(repo.set_provider_member_id(lead_id, "prov-123").await.expect("write"));
        assert!(!repo.set_provider_member_id(LeadId(9999), "prov-123").await.expect("write"));

        let lead = repo.find_by_id(lead_id).await.expect("find").expect("present");
        assert_eq!(lead.provider_member_id.as_deref(), Some("prov-123"));

        pool.close().await;
    }

    #[tokio::test]
    async fn reads_degrade_when_canonical_url_column_is_absent() {
        let pool = setup_pool().await;
        insert_client(&pool).await;
        let lead_id = insert_lead(&pool, 12, Some("https://linkedin.com/in/john-smith")).await;

        // Simulate a database still on the baseline schema.
        sqlx::query("DROP INDEX idx_leads_client_canonical_url")
            .execute(&pool)
            .await
            .expect("drop index");
        sqlx::query("ALTER TABLE leads DROP COLUMN canonical_url")
            .execute(&pool)
            .await
            .expect("drop column");

        let repo = SqlLeadRepository::new(pool.clone());

        let lead = repo.find_by_id(lead_id).await.expect("find").expect("present");
        assert_eq!(lead.canonical_url, None);

        let miss = repo
            .find_by_canonical_url(ClientId(1), "https://linkedin.com/in/john-smith")
            .await
            .expect("degraded lookup");
        assert!(miss.is_none());

        repo.set_canonical_url(lead_id, "https://linkedin.com/in/john-smith")
            .await
            .expect("degraded write is a no-op");

        pool.close().await;
    }
}
