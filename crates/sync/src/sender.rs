use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use leadflow_core::domain::message::{MessageDirection, MessageId, NewMessage};
use leadflow_core::domain::thread::ThreadId;
use leadflow_db::repositories::{
    LeadRepository, MessageRepository, RepositoryError, ThreadRepository,
};
use leadflow_unipile::{GatewayError, MessagingGateway};

/// Hard cap on the thread preview, in characters. Longer bodies are cut
/// and suffixed with an ellipsis.
const PREVIEW_MAX_CHARS: usize = 160;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("thread not found")]
    ThreadNotFound,
    #[error("thread is missing its external account or chat identifier")]
    InvalidThreadIdentifiers,
    #[error("message text must not be empty")]
    EmptyMessage,
    #[error("gateway rejected the message: {0}")]
    SendFailed(String),
    #[error("gateway accepted the message but returned no message id")]
    MessageIdMissing,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl SendError {
    /// Stable code surfaced to API callers and the dashboard.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ThreadNotFound => "thread_not_found",
            Self::InvalidThreadIdentifiers => "invalid_thread_unipile_identifiers",
            Self::EmptyMessage => "empty_message",
            Self::SendFailed(_) => "unipile_send_failed",
            Self::MessageIdMissing => "unipile_message_id_missing",
            Self::Repository(_) => "repository_error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReport {
    /// Local mirror row id; `None` when the row already existed (a caller
    /// retried a send the gateway had already accepted).
    pub message_id: Option<MessageId>,
    pub provider_message_id: String,
    pub deduplicated: bool,
}

#[derive(Clone)]
pub struct OutboundSender {
    threads: Arc<dyn ThreadRepository>,
    messages: Arc<dyn MessageRepository>,
    leads: Arc<dyn LeadRepository>,
    gateway: Arc<dyn MessagingGateway>,
}

impl OutboundSender {
    pub fn new(
        threads: Arc<dyn ThreadRepository>,
        messages: Arc<dyn MessageRepository>,
        leads: Arc<dyn LeadRepository>,
        gateway: Arc<dyn MessagingGateway>,
    ) -> Self {
        Self { threads, messages, leads, gateway }
    }

    /// Sends `text` on the thread's external chat and mirrors it locally,
    /// at most once per provider message id. No retries here; retry policy
    /// belongs to the caller, and the dedup guard makes retries safe.
    pub async fn send(&self, thread_id: ThreadId, text: &str) -> Result<SendReport, SendError> {
        let thread =
            self.threads.find_by_id(thread_id).await?.ok_or(SendError::ThreadNotFound)?;
        if !thread.has_gateway_identifiers() {
            return Err(SendError::InvalidThreadIdentifiers);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SendError::EmptyMessage);
        }

        let receipt = self
            .gateway
            .send_chat_message(&thread.account_id, &thread.chat_id, text)
            .await
            .map_err(|error| match error {
                GatewayError::AllEndpointsRejected(detail) => SendError::SendFailed(detail),
                GatewayError::Transport(error) => SendError::SendFailed(error.to_string()),
            })?;

        // A message we cannot identify cannot be deduplicated later, so it
        // must not be mirrored even though the HTTP call succeeded.
        let Some(provider_message_id) = receipt.provider_message_id else {
            warn!(
                event_name = "sync.send.message_id_missing",
                thread_id = thread.id.0,
                account_id = thread.account_id.as_str(),
            );
            return Err(SendError::MessageIdMissing);
        };

        let sent_at = receipt.sent_at.unwrap_or_else(Utc::now);
        let inserted = self
            .messages
            .insert(NewMessage {
                client_id: thread.client_id,
                account_id: thread.account_id.clone(),
                provider_message_id: provider_message_id.clone(),
                thread_id: thread.id,
                direction: MessageDirection::Outbound,
                sender_name: None,
                sender_url: receipt.sender_url,
                body: text.to_string(),
                sent_at,
                payload_json: None,
            })
            .await?;

        if inserted.is_none() {
            info!(
                event_name = "sync.send.mirror_deduplicated",
                thread_id = thread.id.0,
                provider_message_id = provider_message_id.as_str(),
            );
        }
        self.threads.touch_preview(thread.id, &preview_of(text), sent_at).await?;

        // Outreach bookkeeping on the advisory lead link. The send already
        // happened, so a failure here is logged rather than surfaced.
        if let Some(lead_id) = thread.lead_id {
            if let Err(error) = self.leads.mark_message_sent(lead_id).await {
                warn!(
                    event_name = "sync.send.lead_flag_failed",
                    lead_id = lead_id.0,
                    error = %error,
                );
            }
        }

        Ok(SendReport {
            message_id: inserted,
            provider_message_id,
            deduplicated: inserted.is_none(),
        })
    }
}

fn preview_of(text: &str) -> String {
    if text.chars().count() <= PREVIEW_MAX_CHARS {
        return text.to_string();
    }
    let mut preview: String = text.chars().take(PREVIEW_MAX_CHARS - 1).collect();
    preview.push('…');
    preview
}
