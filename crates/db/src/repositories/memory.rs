//! In-memory repository fakes backing the service-layer tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use leadflow_core::domain::client::Client;
use leadflow_core::domain::invitation::{DmDraftStatus, Invitation, InvitationId};
use leadflow_core::domain::lead::{ClientId, Lead, LeadId};
use leadflow_core::domain::message::{Message, MessageDirection, MessageId, NewMessage};
use leadflow_core::domain::thread::{Thread, ThreadId};

use super::{
    ClientRepository, InvitationRepository, LeadRepository, MessageRepository, RepositoryError,
    ThreadRepository,
};

#[derive(Default)]
pub struct InMemoryClientRepository {
    clients: RwLock<HashMap<i64, Client>>,
}

impl InMemoryClientRepository {
    pub async fn insert(&self, client: Client) {
        self.clients.write().await.insert(client.id.0, client);
    }
}

#[async_trait::async_trait]
impl ClientRepository for InMemoryClientRepository {
    async fn find_by_id(&self, id: ClientId) -> Result<Option<Client>, RepositoryError> {
        Ok(self.clients.read().await.get(&id.0).cloned())
    }

    async fn find_by_account(&self, account_id: &str) -> Result<Option<Client>, RepositoryError> {
        let clients = self.clients.read().await;
        Ok(clients.values().find(|client| client.unipile_account_id == account_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryLeadRepository {
    leads: RwLock<HashMap<i64, Lead>>,
    fail_provider_writes: AtomicBool,
}

impl InMemoryLeadRepository {
    pub async fn insert(&self, lead: Lead) {
        self.leads.write().await.insert(lead.id.0, lead);
    }

    /// Makes subsequent provider-id writes fail, to exercise the
    /// write-failure outcome path.
    pub fn fail_provider_writes(&self) {
        self.fail_provider_writes.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl LeadRepository for InMemoryLeadRepository {
    async fn find_by_id(&self, id: LeadId) -> Result<Option<Lead>, RepositoryError> {
        Ok(self.leads.read().await.get(&id.0).cloned())
    }

    async fn find_by_canonical_url(
        &self,
        client_id: ClientId,
        canonical_url: &str,
    ) -> Result<Option<Lead>, RepositoryError> {
        let leads = self.leads.read().await;
        Ok(leads
            .values()
            .find(|lead| {
                lead.client_id == client_id
                    && lead.canonical_url.as_deref() == Some(canonical_url)
            })
            .cloned())
    }

    async fn set_provider_member_id(
        &self,
        id: LeadId,
        provider_member_id: &str,
    ) -> Result<bool, RepositoryError> {
        if self.fail_provider_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Decode("injected provider-id write failure".to_string()));
        }
        let mut leads = self.leads.write().await;
        let Some(lead) = leads.get_mut(&id.0) else {
            return Ok(false);
        };
        lead.provider_member_id = Some(provider_member_id.to_string());
        lead.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_canonical_url(
        &self,
        id: LeadId,
        canonical_url: &str,
    ) -> Result<(), RepositoryError> {
        let mut leads = self.leads.write().await;
        if let Some(lead) = leads.get_mut(&id.0) {
            lead.canonical_url = Some(canonical_url.to_string());
            lead.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_message_sent(&self, id: LeadId) -> Result<bool, RepositoryError> {
        let mut leads = self.leads.write().await;
        let Some(lead) = leads.get_mut(&id.0) else {
            return Ok(false);
        };
        lead.message_sent = true;
        lead.updated_at = Utc::now();
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryInvitationRepository {
    invitations: RwLock<HashMap<i64, Invitation>>,
}

#[async_trait::async_trait]
impl InvitationRepository for InMemoryInvitationRepository {
    async fn find_by_id(&self, id: InvitationId) -> Result<Option<Invitation>, RepositoryError> {
        Ok(self.invitations.read().await.get(&id.0).cloned())
    }

    async fn scan_after(
        &self,
        cursor: i64,
        limit: u32,
    ) -> Result<Vec<Invitation>, RepositoryError> {
        let invitations = self.invitations.read().await;
        let mut page: Vec<Invitation> =
            invitations.values().filter(|invitation| invitation.id.0 > cursor).cloned().collect();
        page.sort_by_key(|invitation| invitation.id.0);
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn save(&self, invitation: Invitation) -> Result<(), RepositoryError> {
        self.invitations.write().await.insert(invitation.id.0, invitation);
        Ok(())
    }

    async fn mark_accepted(
        &self,
        id: InvitationId,
        accepted_at: DateTime<Utc>,
        payload_json: &str,
    ) -> Result<(), RepositoryError> {
        let mut invitations = self.invitations.write().await;
        if let Some(invitation) = invitations.get_mut(&id.0) {
            invitation.status = leadflow_core::domain::invitation::InvitationStatus::Accepted;
            invitation.accepted_at = invitation.accepted_at.or(Some(accepted_at));
            invitation.payload_json = Some(payload_json.to_string());
            invitation.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_last_error(&self, id: InvitationId, error: &str) -> Result<(), RepositoryError> {
        let mut invitations = self.invitations.write().await;
        if let Some(invitation) = invitations.get_mut(&id.0) {
            invitation.last_error = Some(error.to_string());
            invitation.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn advance_dm_draft_status(
        &self,
        id: InvitationId,
        next: DmDraftStatus,
    ) -> Result<(), RepositoryError> {
        let mut invitations = self.invitations.write().await;
        if let Some(invitation) = invitations.get_mut(&id.0) {
            if invitation.dm_draft_status.can_transition_to(next) {
                invitation.dm_draft_status = next;
                invitation.updated_at = Utc::now();
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryThreadRepository {
    threads: RwLock<HashMap<i64, Thread>>,
    next_id: AtomicI64,
}

impl InMemoryThreadRepository {
    pub async fn insert(&self, thread: Thread) {
        self.next_id.fetch_max(thread.id.0, Ordering::SeqCst);
        self.threads.write().await.insert(thread.id.0, thread);
    }
}

#[async_trait::async_trait]
impl ThreadRepository for InMemoryThreadRepository {
    async fn find_by_id(&self, id: ThreadId) -> Result<Option<Thread>, RepositoryError> {
        Ok(self.threads.read().await.get(&id.0).cloned())
    }

    async fn find_by_external(
        &self,
        client_id: ClientId,
        account_id: &str,
        chat_id: &str,
    ) -> Result<Option<Thread>, RepositoryError> {
        let threads = self.threads.read().await;
        Ok(threads
            .values()
            .find(|thread| {
                thread.client_id == client_id
                    && thread.account_id == account_id
                    && thread.chat_id == chat_id
            })
            .cloned())
    }

    async fn ensure(
        &self,
        client_id: ClientId,
        account_id: &str,
        chat_id: &str,
        lead_id: Option<LeadId>,
    ) -> Result<Thread, RepositoryError> {
        if let Some(existing) = self.find_by_external(client_id, account_id, chat_id).await? {
            return Ok(existing);
        }
        let now = Utc::now();
        let thread = Thread {
            id: ThreadId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            client_id,
            account_id: account_id.to_string(),
            chat_id: chat_id.to_string(),
            lead_id,
            attendee_name: None,
            attendee_url: None,
            last_message_at: None,
            last_message_preview: None,
            unread_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.threads.write().await.insert(thread.id.0, thread.clone());
        Ok(thread)
    }

    async fn touch_preview(
        &self,
        id: ThreadId,
        preview: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut threads = self.threads.write().await;
        if let Some(thread) = threads.get_mut(&id.0) {
            thread.last_message_at = Some(at);
            thread.last_message_preview = Some(preview.to_string());
            thread.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn increment_unread(&self, id: ThreadId) -> Result<(), RepositoryError> {
        let mut threads = self.threads.write().await;
        if let Some(thread) = threads.get_mut(&id.0) {
            thread.unread_count += 1;
            thread.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn fill_attendee(
        &self,
        id: ThreadId,
        name: Option<&str>,
        url: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut threads = self.threads.write().await;
        if let Some(thread) = threads.get_mut(&id.0) {
            if thread.attendee_name.is_none() {
                thread.attendee_name = name.map(str::to_string);
            }
            if thread.attendee_url.is_none() {
                thread.attendee_url = url.map(str::to_string);
            }
            thread.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<Message>>,
    next_id: AtomicI64,
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn find_by_provider_id(
        &self,
        client_id: ClientId,
        account_id: &str,
        provider_message_id: &str,
    ) -> Result<Option<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .find(|message| {
                message.client_id == client_id
                    && message.account_id == account_id
                    && message.provider_message_id == provider_message_id
            })
            .cloned())
    }

    async fn insert(&self, message: NewMessage) -> Result<Option<MessageId>, RepositoryError> {
        let existing = self
            .find_by_provider_id(
                message.client_id,
                &message.account_id,
                &message.provider_message_id,
            )
            .await?;
        if existing.is_some() {
            return Ok(None);
        }

        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.messages.write().await.push(Message {
            id,
            client_id: message.client_id,
            account_id: message.account_id,
            provider_message_id: message.provider_message_id,
            thread_id: message.thread_id,
            direction: message.direction,
            sender_name: message.sender_name,
            sender_url: message.sender_url,
            body: message.body,
            sent_at: message.sent_at,
            payload_json: message.payload_json,
            created_at: Utc::now(),
        });
        Ok(Some(id))
    }

    async fn latest_unresolved_inbound(
        &self,
        thread_id: ThreadId,
    ) -> Result<Option<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|message| {
                message.thread_id == thread_id
                    && message.direction == MessageDirection::Inbound
                    && message.sender_name.is_none()
                    && message.sender_url.is_none()
            })
            .max_by_key(|message| (message.sent_at, message.id.0))
            .cloned())
    }

    async fn fill_sender(
        &self,
        id: MessageId,
        name: Option<&str>,
        url: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        if let Some(message) = messages.iter_mut().find(|message| message.id == id) {
            if message.sender_name.is_none() {
                message.sender_name = name.map(str::to_string);
            }
            if message.sender_url.is_none() {
                message.sender_url = url.map(str::to_string);
            }
        }
        Ok(())
    }
}
