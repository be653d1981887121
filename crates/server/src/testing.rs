//! Handler test harness over in-memory repositories and a canned gateway.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use leadflow_db::repositories::{
    InMemoryClientRepository, InMemoryInvitationRepository, InMemoryLeadRepository,
    InMemoryMessageRepository, InMemoryThreadRepository,
};
use leadflow_sync::{AttendeeResolver, BackfillRunner, OutboundSender, Reconciler};
use leadflow_unipile::{AttendeeProfile, GatewayError, MessagingGateway, SendReceipt};

use crate::bootstrap::Services;

pub struct FakeGateway {
    receipt: SendReceipt,
}

#[async_trait]
impl MessagingGateway for FakeGateway {
    async fn send_chat_message(
        &self,
        _account_id: &str,
        _chat_id: &str,
        _text: &str,
    ) -> Result<SendReceipt, GatewayError> {
        Ok(self.receipt.clone())
    }

    async fn fetch_attendee(
        &self,
        _account_id: &str,
        _attendee_id: &str,
    ) -> Result<Option<AttendeeProfile>, GatewayError> {
        Ok(None)
    }
}

pub struct TestServices {
    pub services: Arc<Services>,
    pub clients: Arc<InMemoryClientRepository>,
    pub leads: Arc<InMemoryLeadRepository>,
    pub invitations: Arc<InMemoryInvitationRepository>,
    pub threads: Arc<InMemoryThreadRepository>,
}

pub fn test_services(webhook_secret: Option<SecretString>) -> TestServices {
    build(webhook_secret, SendReceipt::default())
}

pub fn test_services_with_receipt(receipt: SendReceipt) -> TestServices {
    build(None, receipt)
}

fn build(webhook_secret: Option<SecretString>, receipt: SendReceipt) -> TestServices {
    let clients = Arc::new(InMemoryClientRepository::default());
    let leads = Arc::new(InMemoryLeadRepository::default());
    let invitations = Arc::new(InMemoryInvitationRepository::default());
    let threads = Arc::new(InMemoryThreadRepository::default());
    let messages = Arc::new(InMemoryMessageRepository::default());
    let gateway = Arc::new(FakeGateway { receipt });

    let reconciler = Reconciler::new(clients.clone(), leads.clone());
    let services = Arc::new(Services {
        sender: OutboundSender::new(
            threads.clone(),
            messages.clone(),
            leads.clone(),
            gateway.clone(),
        ),
        resolver: AttendeeResolver::new(gateway, threads.clone(), messages.clone()),
        backfill: BackfillRunner::new(invitations.clone(), reconciler.clone()),
        reconciler,
        clients: clients.clone(),
        invitations: invitations.clone(),
        threads: threads.clone(),
        messages,
        webhook_secret,
    });

    TestServices { services, clients, leads, invitations, threads }
}
