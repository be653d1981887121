use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use leadflow_core::canonical::canonicalize_profile_url;
use leadflow_core::domain::thread::ThreadId;
use leadflow_db::repositories::{MessageRepository, ThreadRepository};
use leadflow_unipile::MessagingGateway;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedAttendee {
    pub name: Option<String>,
    /// URL exactly as the gateway returned it, for display.
    pub profile_url: Option<String>,
    /// Derived matching key. `None` whenever the gateway URL does not
    /// canonicalize; the raw value never substitutes for it.
    pub canonical_url: Option<String>,
}

impl ResolvedAttendee {
    /// URL to show or store in display fields: the canonical form when one
    /// exists, the raw gateway URL otherwise.
    pub fn display_url(&self) -> Option<&str> {
        self.canonical_url.as_deref().or(self.profile_url.as_deref())
    }
}

/// Best-effort attendee identity resolution. One directory call per
/// `(account, attendee)` pair per process; any failure resolves to `None`
/// so the surrounding message pipeline never stalls on identity.
pub struct AttendeeResolver {
    gateway: Arc<dyn MessagingGateway>,
    threads: Arc<dyn ThreadRepository>,
    messages: Arc<dyn MessageRepository>,
    cache: DashMap<(String, String), ResolvedAttendee>,
}

impl AttendeeResolver {
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        threads: Arc<dyn ThreadRepository>,
        messages: Arc<dyn MessageRepository>,
    ) -> Self {
        Self { gateway, threads, messages, cache: DashMap::new() }
    }

    /// Resolves the attendee and, when a thread is given, opportunistically
    /// persists the identity onto the latest unresolved inbound message and
    /// the thread itself. Persisted fields are fill-if-empty only.
    pub async fn resolve(
        &self,
        account_id: &str,
        attendee_id: &str,
        thread_id: Option<ThreadId>,
    ) -> Option<ResolvedAttendee> {
        let key = (account_id.to_string(), attendee_id.to_string());
        let resolved = match self.cache.get(&key) {
            Some(cached) => cached.clone(),
            None => {
                let profile = match self.gateway.fetch_attendee(account_id, attendee_id).await {
                    Ok(profile) => profile?,
                    Err(error) => {
                        warn!(
                            event_name = "sync.resolver.lookup_failed",
                            account_id,
                            attendee_id,
                            error = %error,
                        );
                        return None;
                    }
                };

                let canonical_url = canonicalize_profile_url(profile.profile_url.as_deref());
                let resolved = ResolvedAttendee {
                    name: profile.name,
                    profile_url: profile.profile_url,
                    canonical_url,
                };
                debug!(
                    event_name = "sync.resolver.resolved",
                    account_id,
                    attendee_id,
                    name = resolved.name.as_deref(),
                );
                self.cache.insert(key, resolved.clone());
                resolved
            }
        };

        if let Some(thread_id) = thread_id {
            self.persist(thread_id, &resolved).await;
        }
        Some(resolved)
    }

    async fn persist(&self, thread_id: ThreadId, resolved: &ResolvedAttendee) {
        let name = resolved.name.as_deref();
        let url = resolved.display_url();

        match self.messages.latest_unresolved_inbound(thread_id).await {
            Ok(Some(message)) => {
                if let Err(error) = self.messages.fill_sender(message.id, name, url).await {
                    warn!(
                        event_name = "sync.resolver.sender_fill_failed",
                        message_id = message.id.0,
                        error = %error,
                    );
                }
            }
            Ok(None) => {}
            Err(error) => {
                warn!(
                    event_name = "sync.resolver.unresolved_lookup_failed",
                    thread_id = thread_id.0,
                    error = %error,
                );
            }
        }

        if let Err(error) = self.threads.fill_attendee(thread_id, name, url).await {
            warn!(
                event_name = "sync.resolver.attendee_fill_failed",
                thread_id = thread_id.0,
                error = %error,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;

    use leadflow_core::domain::lead::ClientId;
    use leadflow_core::domain::message::{MessageDirection, NewMessage};
    use leadflow_db::repositories::{
        InMemoryMessageRepository, InMemoryThreadRepository, MessageRepository, ThreadRepository,
    };
    use leadflow_unipile::{AttendeeProfile, GatewayError, MessagingGateway, SendReceipt};

    use super::AttendeeResolver;

    struct FakeDirectory {
        profile: Option<AttendeeProfile>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeDirectory {
        fn with(profile: AttendeeProfile) -> Self {
            Self { profile: Some(profile), fail: false, calls: AtomicUsize::new(0) }
        }

        fn failing() -> Self {
            Self { profile: None, fail: true, calls: AtomicUsize::new(0) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MessagingGateway for FakeDirectory {
        async fn send_chat_message(
            &self,
            _account_id: &str,
            _chat_id: &str,
            _text: &str,
        ) -> Result<SendReceipt, GatewayError> {
            Ok(SendReceipt::default())
        }

        async fn fetch_attendee(
            &self,
            _account_id: &str,
            _attendee_id: &str,
        ) -> Result<Option<AttendeeProfile>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GatewayError::AllEndpointsRejected("directory down".to_string()));
            }
            Ok(self.profile.clone())
        }
    }

    fn profile() -> AttendeeProfile {
        AttendeeProfile {
            name: Some("Jane Doe".to_string()),
            profile_url: Some("https://www.linkedin.com/in/Jane-Doe/".to_string()),
        }
    }

    #[tokio::test]
    async fn caches_after_the_first_directory_call() {
        let directory = Arc::new(FakeDirectory::with(profile()));
        let resolver = AttendeeResolver::new(
            directory.clone(),
            Arc::new(InMemoryThreadRepository::default()),
            Arc::new(InMemoryMessageRepository::default()),
        );

        let first = resolver.resolve("acct-1", "att-1", None).await.expect("resolved");
        assert_eq!(first.name.as_deref(), Some("Jane Doe"));
        assert_eq!(first.canonical_url.as_deref(), Some("https://linkedin.com/in/jane-doe"));

        let second = resolver.resolve("acct-1", "att-1", None).await.expect("resolved");
        assert_eq!(second, first);
        assert_eq!(directory.calls(), 1);

        resolver.resolve("acct-1", "att-2", None).await;
        assert_eq!(directory.calls(), 2);
    }

    #[tokio::test]
    async fn off_network_url_yields_no_matching_key_but_still_displays() {
        let threads = Arc::new(InMemoryThreadRepository::default());
        let thread = threads
            .ensure(ClientId(1), "acct-1", "chat-1", None)
            .await
            .expect("ensure thread");
        let directory = Arc::new(FakeDirectory::with(AttendeeProfile {
            name: Some("Jane Doe".to_string()),
            profile_url: Some("https://example.com/people/jane".to_string()),
        }));
        let resolver = AttendeeResolver::new(
            directory,
            threads.clone(),
            Arc::new(InMemoryMessageRepository::default()),
        );

        let resolved =
            resolver.resolve("acct-1", "att-1", Some(thread.id)).await.expect("resolved");
        assert_eq!(resolved.canonical_url, None);
        assert_eq!(resolved.profile_url.as_deref(), Some("https://example.com/people/jane"));

        let stored = threads.find_by_id(thread.id).await.expect("find").expect("present");
        assert_eq!(stored.attendee_url.as_deref(), Some("https://example.com/people/jane"));
    }

    #[tokio::test]
    async fn directory_failure_resolves_to_none_and_is_not_cached() {
        let directory = Arc::new(FakeDirectory::failing());
        let resolver = AttendeeResolver::new(
            directory.clone(),
            Arc::new(InMemoryThreadRepository::default()),
            Arc::new(InMemoryMessageRepository::default()),
        );

        assert!(resolver.resolve("acct-1", "att-1", None).await.is_none());
        assert!(resolver.resolve("acct-1", "att-1", None).await.is_none());
        assert_eq!(directory.calls(), 2);
    }

    #[tokio::test]
    async fn fills_the_latest_unresolved_message_and_the_thread() {
        let threads = Arc::new(InMemoryThreadRepository::default());
        let thread = threads
            .ensure(ClientId(1), "acct-1", "chat-1", None)
            .await
            .expect("ensure thread");
        let messages = Arc::new(InMemoryMessageRepository::default());
        let message_id = messages
            .insert(NewMessage {
                client_id: ClientId(1),
                account_id: "acct-1".to_string(),
                provider_message_id: "m-1".to_string(),
                thread_id: thread.id,
                direction: MessageDirection::Inbound,
                sender_name: None,
                sender_url: None,
                body: "hi".to_string(),
                sent_at: Utc::now(),
                payload_json: None,
            })
            .await
            .expect("insert")
            .expect("inserted");

        let resolver = AttendeeResolver::new(
            Arc::new(FakeDirectory::with(profile())),
            threads.clone(),
            messages.clone(),
        );
        resolver.resolve("acct-1", "att-1", Some(thread.id)).await.expect("resolved");

        let stored_thread = threads.find_by_id(thread.id).await.expect("find").expect("present");
        assert_eq!(stored_thread.attendee_name.as_deref(), Some("Jane Doe"));
        assert_eq!(
            stored_thread.attendee_url.as_deref(),
            Some("https://linkedin.com/in/jane-doe"),
        );

        let stored_message = messages
            .find_by_provider_id(ClientId(1), "acct-1", "m-1")
            .await
            .expect("find")
            .expect("present");
        assert_eq!(stored_message.id, message_id);
        assert_eq!(stored_message.sender_name.as_deref(), Some("Jane Doe"));
    }

    #[tokio::test]
    async fn never_overwrites_an_already_resolved_attendee() {
        let threads = Arc::new(InMemoryThreadRepository::default());
        let thread = threads
            .ensure(ClientId(1), "acct-1", "chat-1", None)
            .await
            .expect("ensure thread");
        threads
            .fill_attendee(thread.id, Some("Original Name"), None)
            .await
            .expect("seed attendee");

        let resolver = AttendeeResolver::new(
            Arc::new(FakeDirectory::with(profile())),
            threads.clone(),
            Arc::new(InMemoryMessageRepository::default()),
        );
        resolver.resolve("acct-1", "att-1", Some(thread.id)).await.expect("resolved");

        let stored = threads.find_by_id(thread.id).await.expect("find").expect("present");
        assert_eq!(stored.attendee_name.as_deref(), Some("Original Name"));
        assert_eq!(stored.attendee_url.as_deref(), Some("https://linkedin.com/in/jane-doe"));
    }
}
