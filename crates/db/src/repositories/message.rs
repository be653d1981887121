use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use leadflow_core::domain::lead::ClientId;
use leadflow_core::domain::message::{Message, MessageDirection, MessageId, NewMessage};
use leadflow_core::domain::thread::ThreadId;

use super::{parse_timestamp, MessageRepository, RepositoryError};
use crate::DbPool;

const MESSAGE_COLUMNS: &str = "id, client_id, account_id, provider_message_id, thread_id,
    direction, sender_name, sender_url, body, sent_at, payload_json, created_at";

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn find_by_provider_id(
        &self,
        client_id: ClientId,
        account_id: &str,
        provider_message_id: &str,
    ) -> Result<Option<Message>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE client_id = ? AND account_id = ? AND provider_message_id = ?"
        ))
        .bind(client_id.0)
        .bind(account_id)
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(message_from_row).transpose()
    }

    async fn insert(&self, message: NewMessage) -> Result<Option<MessageId>, RepositoryError> {
        // The unique index on (client, account, provider message id) is the
        // concurrency authority; the losing writer sees zero rows affected.
        let result = sqlx::query(
            "INSERT INTO messages (client_id, account_id, provider_message_id, thread_id,
                                   direction, sender_name, sender_url, body, sent_at,
                                   payload_json, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(client_id, account_id, provider_message_id) DO NOTHING",
        )
        .bind(message.client_id.0)
        .bind(&message.account_id)
        .bind(&message.provider_message_id)
        .bind(message.thread_id.0)
        .bind(message.direction.as_str())
        .bind(message.sender_name.as_deref())
        .bind(message.sender_url.as_deref())
        .bind(&message.body)
        .bind(message.sent_at.to_rfc3339())
        .bind(message.payload_json.as_deref())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(MessageId(result.last_insert_rowid())))
    }

    async fn latest_unresolved_inbound(
        &self,
        thread_id: ThreadId,
    ) -> Result<Option<Message>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE thread_id = ? AND direction = 'inbound'
               AND sender_name IS NULL AND sender_url IS NULL
             ORDER BY sent_at DESC, id DESC
             LIMIT 1"
        ))
        .bind(thread_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(message_from_row).transpose()
    }

    async fn fill_sender(
        &self,
        id: MessageId,
        name: Option<&str>,
        url: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE messages
             SET sender_name = COALESCE(sender_name, ?),
                 sender_url = COALESCE(sender_url, ?)
             WHERE id = ?",
        )
        .bind(name)
        .bind(url)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn message_from_row(row: SqliteRow) -> Result<Message, RepositoryError> {
    let direction_raw = row.try_get::<String, _>("direction")?;
    let direction = MessageDirection::parse(&direction_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown message direction `{direction_raw}`"))
    })?;

    Ok(Message {
        id: MessageId(row.try_get("id")?),
        client_id: ClientId(row.try_get("client_id")?),
        account_id: row.try_get("account_id")?,
        provider_message_id: row.try_get("provider_message_id")?,
        thread_id: ThreadId(row.try_get("thread_id")?),
        direction,
        sender_name: row.try_get("sender_name")?,
        sender_url: row.try_get("sender_url")?,
        body: row.try_get("body")?,
        sent_at: parse_timestamp("sent_at", row.try_get("sent_at")?)?,
        payload_json: row.try_get("payload_json")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use leadflow_core::domain::lead::ClientId;
    use leadflow_core::domain::message::{MessageDirection, NewMessage};
    use leadflow_core::domain::thread::ThreadId;

    use super::SqlMessageRepository;
    use crate::repositories::{MessageRepository, SqlThreadRepository, ThreadRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> (DbPool, ThreadId) {
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
        let thread = SqlThreadRepository::new(pool.clone())
            .ensure(ClientId(1), "acct-1", "chat-1", None)
            .await
            .expect("ensure thread");
        (pool, thread.id)
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn sample_message(thread_id: ThreadId, provider_message_id: &str) -> NewMessage {
        NewMessage {
            client_id: ClientId(1),
            account_id: "acct-1".to_string(),
            provider_message_id: provider_message_id.to_string(),
            thread_id,
            direction: MessageDirection::Inbound,
            sender_name: None,
            sender_url: None,
            body: "hello there".to_string(),
            sent_at: parse_ts("2026-03-01T10:00:00Z"),
            payload_json: None,
        }
    }

    #[tokio::test]
    async fn duplicate_provider_id_is_rejected_by_the_store() {
        let (pool, thread_id) = setup().await;
        let repo = SqlMessageRepository::new(pool.clone());

        let first = repo.insert(sample_message(thread_id, "m-1")).await.expect("insert");
        assert!(first.is_some());
        let second = repo.insert(sample_message(thread_id, "m-1")).await.expect("replay");
        assert_eq!(second, None);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn unresolved_inbound_lookup_and_fill_sender() {
        let (pool, thread_id) = setup().await;
        let repo = SqlMessageRepository::new(pool.clone());

        let mut resolved = sample_message(thread_id, "m-1");
        resolved.sender_name = Some("Jane Doe".to_string());
        resolved.sender_url = Some("https://linkedin.com/in/jane".to_string());
        repo.insert(resolved).await.expect("insert resolved");

        let mut later = sample_message(thread_id, "m-2");
        later.sent_at = parse_ts("2026-03-01T11:00:00Z");
        let later_id = repo.insert(later).await.expect("insert").expect("inserted");

        let unresolved =
            repo.latest_unresolved_inbound(thread_id).await.expect("lookup").expect("present");
        assert_eq!(unresolved.id, later_id);

        repo.fill_sender(later_id, Some("Jane Doe"), None).await.expect("fill");
        repo.fill_sender(later_id, Some("Someone Else"), Some("https://linkedin.com/in/jane"))
            .await
            .expect("second fill");

        let stored = repo
            .find_by_provider_id(ClientId(1), "acct-1", "m-2")
            .await
            .expect("find")
            .expect("present");
        assert_eq!(stored.sender_name.as_deref(), Some("Jane Doe"));
        assert_eq!(stored.sender_url.as_deref(), Some("https://linkedin.com/in/jane"));

        pool.close().await;
    }
}
