use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use leadflow_core::domain::lead::{ClientId, LeadId};
use leadflow_core::domain::thread::{Thread, ThreadId};

use super::{
    parse_optional_timestamp, parse_timestamp, RepositoryError, ThreadRepository,
};
use crate::DbPool;

const THREAD_COLUMNS: &str = "id, client_id, account_id, chat_id, lead_id, attendee_name,
    attendee_url, last_message_at, last_message_preview, unread_count, created_at, updated_at";

pub struct SqlThreadRepository {
    pool: DbPool,
}

impl SqlThreadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ThreadRepository for SqlThreadRepository {
    async fn find_by_id(&self, id: ThreadId) -> Result<Option<Thread>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(thread_from_row).transpose()
    }

    async fn find_by_external(
        &self,
        client_id: ClientId,
        account_id: &str,
        chat_id: &str,
    ) -> Result<Option<Thread>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {THREAD_COLUMNS} FROM threads
             WHERE client_id = ? AND account_id = ? AND chat_id = ?"
        ))
        .bind(client_id.0)
        .bind(account_id)
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(thread_from_row).transpose()
    }

    async fn ensure(
        &self,
        client_id: ClientId,
        account_id: &str,
        chat_id: &str,
        lead_id: Option<LeadId>,
    ) -> Result<Thread, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO threads (client_id, account_id, chat_id, lead_id, unread_count,
                                  created_at, updated_at)
             VALUES (?, ?, ?, ?, 0, ?, ?)
             ON CONFLICT(client_id, account_id, chat_id) DO NOTHING",
        )
        .bind(client_id.0)
        .bind(account_id)
        .bind(chat_id)
        .bind(lead_id.map(|id| id.0))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.find_by_external(client_id, account_id, chat_id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!(
                "thread for account `{account_id}` chat `{chat_id}` missing after upsert"
            ))
        })
    }

    async fn touch_preview(
        &self,
        id: ThreadId,
        preview: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE threads
             SET last_message_at = ?, last_message_preview = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(at.to_rfc3339())
        .bind(preview)
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_unread(&self, id: ThreadId) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE threads SET unread_count = unread_count + 1, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fill_attendee(
        &self,
        id: ThreadId,
        name: Option<&str>,
        url: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE threads
             SET attendee_name = COALESCE(attendee_name, ?),
                 attendee_url = COALESCE(attendee_url, ?),
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(name)
        .bind(url)
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn thread_from_row(row: SqliteRow) -> Result<Thread, RepositoryError> {
    Ok(Thread {
        id: ThreadId(row.try_get("id")?),
        client_id: ClientId(row.try_get("client_id")?),
        account_id: row.try_get("account_id")?,
        chat_id: row.try_get("chat_id")?,
        lead_id: row.try_get::<Option<i64>, _>("lead_id")?.map(LeadId),
        attendee_name: row.try_get("attendee_name")?,
        attendee_url: row.try_get("attendee_url")?,
        last_message_at: parse_optional_timestamp(
            "last_message_at",
            row.try_get("last_message_at")?,
        )?,
        last_message_preview: row.try_get("last_message_preview")?,
        unread_count: row.try_get("unread_count")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
