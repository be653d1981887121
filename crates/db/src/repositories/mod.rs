use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use leadflow_core::domain::client::Client;
use leadflow_core::domain::invitation::{Invitation, InvitationId};
use leadflow_core::domain::lead::{ClientId, Lead, LeadId};
use leadflow_core::domain::message::{Message, MessageId, NewMessage};
use leadflow_core::domain::thread::{Thread, ThreadId};

pub mod client;
pub mod invitation;
pub mod lead;
pub mod memory;
pub mod message;
pub mod thread;

pub use client::SqlClientRepository;
pub use invitation::SqlInvitationRepository;
pub use lead::SqlLeadRepository;
pub use memory::{
    InMemoryClientRepository, InMemoryInvitationRepository, InMemoryLeadRepository,
    InMemoryMessageRepository, InMemoryThreadRepository,
};
pub use message::SqlMessageRepository;
pub use thread::SqlThreadRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn find_by_id(&self, id: ClientId) -> Result<Option<Client>, RepositoryError>;
    async fn find_by_account(&self, account_id: &str) -> Result<Option<Client>, RepositoryError>;
}

#[async_trait]
pub trait LeadRepository: Send + Sync {
    async fn find_by_id(&self, id: LeadId) -> Result<Option<Lead>, RepositoryError>;

    /// Lookup by the derived matching key, scoped to one client. Resolves
    /// to `None` when the canonical-url column does not exist yet.
    async fn find_by_canonical_url(
        &self,
        client_id: ClientId,
        canonical_url: &str,
    ) -> Result<Option<Lead>, RepositoryError>;

    /// Writes the provider-assigned member id. Returns `false` when the
    /// lead row no longer exists.
    async fn set_provider_member_id(
        &self,
        id: LeadId,
        provider_member_id: &str,
    ) -> Result<bool, RepositoryError>;

    /// Persists the derived matching key. A no-op on stores where the
    /// column does not exist yet.
    async fn set_canonical_url(
        &self,
        id: LeadId,
        canonical_url: &str,
    ) -> Result<(), RepositoryError>;

    async fn mark_message_sent(&self, id: LeadId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait InvitationRepository: Send + Sync {
    async fn find_by_id(&self, id: InvitationId) -> Result<Option<Invitation>, RepositoryError>;

    /// Scans rows with id strictly greater than `cursor`, ascending, at
    /// most `limit` rows. Tolerates id gaps from deleted rows.
    async fn scan_after(
        &self,
        cursor: i64,
        limit: u32,
    ) -> Result<Vec<Invitation>, RepositoryError>;

    async fn save(&self, invitation: Invitation) -> Result<(), RepositoryError>;

    /// Marks the invitation accepted and stores the raw webhook payload.
    /// Idempotent; the first accepted_at wins.
    async fn mark_accepted(
        &self,
        id: InvitationId,
        accepted_at: DateTime<Utc>,
        payload_json: &str,
    ) -> Result<(), RepositoryError>;

    async fn set_last_error(&self, id: InvitationId, error: &str) -> Result<(), RepositoryError>;

    /// Advances the draft-message status. Regressions are silently ignored
    /// (the status only moves `none → draft → sent`).
    async fn advance_dm_draft_status(
        &self,
        id: InvitationId,
        next: leadflow_core::domain::invitation::DmDraftStatus,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ThreadRepository: Send + Sync {
    async fn find_by_id(&self, id: ThreadId) -> Result<Option<Thread>, RepositoryError>;

    async fn find_by_external(
        &self,
        client_id: ClientId,
        account_id: &str,
        chat_id: &str,
    ) -> Result<Option<Thread>, RepositoryError>;

    /// Creates the thread for `(client, account, chat)` if absent and
    /// returns it either way.
    async fn ensure(
        &self,
        client_id: ClientId,
        account_id: &str,
        chat_id: &str,
        lead_id: Option<LeadId>,
    ) -> Result<Thread, RepositoryError>;

    async fn touch_preview(
        &self,
        id: ThreadId,
        preview: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn increment_unread(&self, id: ThreadId) -> Result<(), RepositoryError>;

    /// Fills attendee display fields only where currently empty.
    async fn fill_attendee(
        &self,
        id: ThreadId,
        name: Option<&str>,
        url: Option<&str>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn find_by_provider_id(
        &self,
        client_id: ClientId,
        account_id: &str,
        provider_message_id: &str,
    ) -> Result<Option<Message>, RepositoryError>;

    /// Dedup-guarded insert. Returns the stored id, or `None` when a row
    /// with the same `(client, account, provider message id)` already
    /// exists (the losing writer under concurrency).
    async fn insert(&self, message: NewMessage) -> Result<Option<MessageId>, RepositoryError>;

    /// Most recent inbound message on the thread whose sender is still
    /// unresolved, if any.
    async fn latest_unresolved_inbound(
        &self,
        thread_id: ThreadId,
    ) -> Result<Option<Message>, RepositoryError>;

    /// Fills sender fields only where currently empty.
    async fn fill_sender(
        &self,
        id: MessageId,
        name: Option<&str>,
        url: Option<&str>,
    ) -> Result<(), RepositoryError>;
}

/// Signature of the store's "undefined column" failure, used to degrade to
/// a narrower column list during rolling schema migrations. SQLite reports
/// `no such column`; Postgres uses SQLSTATE 42703.
pub(crate) fn is_missing_column_error(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => {
            db.message().contains("no such column")
                || db.code().as_deref() == Some("42703")
        }
        _ => false,
    }
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}
