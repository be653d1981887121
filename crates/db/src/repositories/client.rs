use sqlx::{sqlite::SqliteRow, Row};

use leadflow_core::domain::client::Client;
use leadflow_core::domain::lead::ClientId;

use super::{parse_timestamp, ClientRepository, RepositoryError};
use crate::DbPool;

pub struct SqlClientRepository {
    pool: DbPool,
}

impl SqlClientRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ClientRepository for SqlClientRepository {
    async fn find_by_id(&self, id: ClientId) -> Result<Option<Client>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, unipile_account_id, created_at FROM clients WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(client_from_row).transpose()
    }

    async fn find_by_account(&self, account_id: &str) -> Result<Option<Client>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, unipile_account_id, created_at
             FROM clients
             WHERE unipile_account_id = ?",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(client_from_row).transpose()
    }
}

fn client_from_row(row: SqliteRow) -> Result<Client, RepositoryError> {
    Ok(Client {
        id: ClientId(row.try_get("id")?),
        name: row.try_get("name")?,
        unipile_account_id: row.try_get("unipile_account_id")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
