//! Session behaviour against an in-memory mail provider.
//!
//! All tests run on a paused clock, so retry delays and poll intervals elapse instantly
//! once every task is idle.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempmail_sync::{
    Domain, Error, KeyValueStore, MailProvider, MailSession, Mailbox, MemoryStore, MessageFull,
    MessageSummary, Operation, Result, Sender, SessionConfig, SessionEvent, StateStore,
};
use tokio::sync::broadcast::Receiver;

// ─────────────────────────────────────────────────────────────────────────────
// Fake provider
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeProvider {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, String>,
    issued: usize,
    /// Inbox handed to the next account created.
    seed_inbox: Vec<MessageFull>,
    /// Number of upcoming `domains` calls that fail.
    domain_failures: usize,
    /// Number of upcoming `issue_token` calls that fail with a 503.
    token_failures: usize,
    failing_fetches: HashSet<String>,
    fetch_delay: Option<Duration>,
    /// Per-message fetch latency, overriding `fetch_delay`.
    fetch_delays: HashMap<String, Duration>,
    created: Vec<String>,
}

struct Account {
    password: String,
    /// Newest first.
    inbox: Vec<MessageFull>,
}

impl FakeProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    fn deliver(&self, address: &str, message: MessageFull) {
        self.with(|s| {
            s.accounts
                .get_mut(address)
                .expect("account exists")
                .inbox
                .insert(0, message);
        });
    }

    fn expire_tokens(&self) {
        self.with(|s| s.tokens.clear());
    }

    fn delete_account(&self, address: &str) {
        self.with(|s| s.accounts.remove(address));
    }

    fn created(&self) -> Vec<String> {
        self.with(|s| s.created.clone())
    }

    fn authorize(&self, token: &SecretString, operation: Operation) -> Result<String> {
        self.with(|s| s.tokens.get(token.expose_secret()).cloned())
            .ok_or(Error::Unauthorized { operation })
    }
}

#[async_trait]
impl MailProvider for FakeProvider {
    async fn domains(&self) -> Result<Vec<Domain>> {
        self.with(|s| {
            if s.domain_failures > 0 {
                s.domain_failures -= 1;
                return Err(Error::Status {
                    operation: Operation::ListDomains,
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            Ok(vec![
                Domain {
                    domain: "inbox.test".into(),
                    is_active: true,
                },
                Domain {
                    domain: "spare.test".into(),
                    is_active: true,
                },
            ])
        })
    }

    async fn create_account(&self, address: &str, password: &str) -> Result<()> {
        self.with(|s| {
            if s.accounts.contains_key(address) {
                return Err(Error::Status {
                    operation: Operation::CreateAccount,
                    status: 422,
                    body: "address already used".into(),
                });
            }
            let inbox = std::mem::take(&mut s.seed_inbox);
            s.accounts.insert(
                address.to_string(),
                Account {
                    password: password.to_string(),
                    inbox,
                },
            );
            s.created.push(address.to_string());
            Ok(())
        })
    }

    async fn issue_token(&self, address: &str, password: &str) -> Result<SecretString> {
        self.with(|s| {
            if s.token_failures > 0 {
                s.token_failures -= 1;
                return Err(Error::Status {
                    operation: Operation::IssueToken,
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            match s.accounts.get(address) {
                Some(account) if account.password == password => {}
                _ => {
                    return Err(Error::Unauthorized {
                        operation: Operation::IssueToken,
                    })
                }
            }
            s.issued += 1;
            let token = format!("tok-{}", s.issued);
            s.tokens.insert(token.clone(), address.to_string());
            Ok(SecretString::from(token))
        })
    }

    async fn list_messages(
        &self,
        token: &SecretString,
        limit: Option<usize>,
    ) -> Result<Vec<MessageSummary>> {
        let address = self.authorize(token, Operation::ListMessages)?;
        self.with(|s| {
            let inbox = s
                .accounts
                .get(&address)
                .map(|account| account.inbox.as_slice())
                .unwrap_or_default();
            Ok(inbox
                .iter()
                .take(limit.unwrap_or(usize::MAX))
                .map(|message| message.summary.clone())
                .collect())
        })
    }

    async fn fetch_message(&self, token: &SecretString, id: &str) -> Result<MessageFull> {
        let address = self.authorize(token, Operation::FetchMessage)?;

        if let Some(delay) = self.with(|s| s.fetch_delays.get(id).copied().or(s.fetch_delay)) {
            tokio::time::sleep(delay).await;
        }

        self.with(|s| {
            if s.failing_fetches.contains(id) {
                return Err(Error::Status {
                    operation: Operation::FetchMessage,
                    status: 500,
                    body: String::new(),
                });
            }
            s.accounts
                .get(&address)
                .and_then(|account| account.inbox.iter().find(|m| m.id() == id))
                .cloned()
                .ok_or(Error::Status {
                    operation: Operation::FetchMessage,
                    status: 404,
                    body: "not found".into(),
                })
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Memory store whose contents stay inspectable after being handed to a session.
#[derive(Clone, Default)]
struct SharedStore(Arc<MemoryStore>);

impl KeyValueStore for SharedStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.0.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.0.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.0.remove(key)
    }
}

fn message(id: &str, text: &str) -> MessageFull {
    MessageFull {
        summary: MessageSummary {
            id: id.into(),
            from: Some(Sender {
                address: "noreply@shop.test".into(),
                name: None,
            }),
            subject: format!("Message {id}"),
            created_at: Utc::now(),
        },
        text: text.into(),
        html: String::new(),
    }
}

fn config() -> SessionConfig {
    SessionConfig::builder().build().unwrap()
}

fn session_with(fake: &Arc<FakeProvider>, config: SessionConfig, store: &SharedStore) -> MailSession {
    MailSession::new(fake.clone(), config, StateStore::new(store.clone()))
}

fn session(fake: &Arc<FakeProvider>) -> MailSession {
    session_with(fake, config(), &SharedStore::default())
}

fn drain(rx: &mut Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn new_message_ids(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::NewMessage(message) => Some(message.id().to_string()),
            _ => None,
        })
        .collect()
}

async fn snapshot_ids(session: &MailSession) -> Vec<String> {
    session
        .snapshot()
        .await
        .iter()
        .map(|message| message.id().to_string())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Startup and provisioning
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_start_provisions_and_loads_inbox() {
    let fake = FakeProvider::new();
    fake.with(|s| {
        s.seed_inbox = vec![
            message("3", "Your code: 123456"),
            message("2", "hello"),
            message("1", "welcome"),
        ];
    });
    let store = SharedStore::default();
    let session = session_with(&fake, config(), &store);
    let mut events = session.subscribe();

    session.start().await.unwrap();
    session.stop_polling();

    let address = session.address().unwrap();
    assert!(address.ends_with("@inbox.test"), "first listed domain: {address}");
    assert_eq!(address.split('@').next().unwrap().len(), 8);

    let events = drain(&mut events);
    assert!(matches!(&events[0], SessionEvent::MailboxReady { address: a } if *a == address));
    match &events[1] {
        SessionEvent::InboxLoaded { messages } => {
            let ids: Vec<_> = messages.iter().map(|m| m.id()).collect();
            assert_eq!(ids, vec!["3", "2", "1"]);
            assert_eq!(messages[0].otp(), Some("123456"));
        }
        other => panic!("unexpected event {other:?}"),
    }

    assert_eq!(snapshot_ids(&session).await, vec!["3", "2", "1"]);

    let persisted = StateStore::new(store.clone()).load_mailbox().unwrap().unwrap();
    assert_eq!(persisted.address(), address);
}

#[tokio::test(start_paused = true)]
async fn test_start_restores_persisted_mailbox() {
    let fake = FakeProvider::new();
    fake.create_account("kept@inbox.test", "pw").await.unwrap();
    let token = fake.issue_token("kept@inbox.test", "pw").await.unwrap();
    fake.deliver("kept@inbox.test", message("a", "hi"));

    let store = SharedStore::default();
    StateStore::new(store.clone())
        .save_mailbox(&Mailbox::new("kept@inbox.test", "pw", token.expose_secret()).unwrap())
        .unwrap();

    let session = session_with(&fake, config(), &store);
    session.start().await.unwrap();
    session.stop_polling();

    assert_eq!(session.address().as_deref(), Some("kept@inbox.test"));
    assert_eq!(fake.created(), vec!["kept@inbox.test"]);
    assert_eq!(snapshot_ids(&session).await, vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn test_provisioning_retries_after_fixed_delay() {
    let fake = FakeProvider::new();
    fake.with(|s| s.domain_failures = 2);
    let session = session(&fake);
    let mut events = session.subscribe();

    let started = tokio::time::Instant::now();
    session.start().await.unwrap();
    session.stop_polling();

    assert!(started.elapsed() >= Duration::from_millis(3000));

    let events = drain(&mut events);
    let failures: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::ProvisioningFailed { retry_in, .. } => Some(*retry_in),
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec![Duration::from_millis(1500); 2]);
    assert!(events
        .iter()
        .any(|event| matches!(event, SessionEvent::MailboxReady { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_provisioning_gives_up_after_max_attempts() {
    let fake = FakeProvider::new();
    fake.with(|s| s.domain_failures = usize::MAX);
    let config = SessionConfig::builder().max_attempts(3).build().unwrap();
    let session = session_with(&fake, config, &SharedStore::default());
    let mut events = session.subscribe();

    let err = session.start().await.unwrap_err();

    match err {
        Error::ProvisioningExhausted { attempts, source } => {
            assert_eq!(attempts, 3);
            assert_eq!(source.operation(), Some(Operation::ListDomains));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(session.mailbox().is_none());
    assert!(!session.is_polling());

    // Only attempts that are retried are announced
    let announced = drain(&mut events)
        .iter()
        .filter(|event| matches!(event, SessionEvent::ProvisioningFailed { .. }))
        .count();
    assert_eq!(announced, 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbox loading and polling
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_poll_emits_new_messages_oldest_first() {
    let fake = FakeProvider::new();
    fake.with(|s| s.seed_inbox = vec![message("3", ""), message("2", ""), message("1", "")]);
    let session = session(&fake);
    session.start().await.unwrap();
    session.stop_polling();
    let address = session.address().unwrap();
    let mut events = session.subscribe();

    fake.deliver(&address, message("4", ""));
    fake.deliver(&address, message("5", "verification code: 998877"));

    assert_eq!(session.poll_once().await.unwrap(), 2);

    let events = drain(&mut events);
    assert_eq!(new_message_ids(&events), vec!["4", "5"]);
    match events.last() {
        Some(SessionEvent::NewMessage(message)) => {
            assert_eq!(message.otp(), Some("998877"));
            assert_eq!(message.notification(), "New email from noreply@shop.test");
        }
        other => panic!("unexpected event {other:?}"),
    }

    assert_eq!(snapshot_ids(&session).await, vec!["5", "4", "3", "2", "1"]);
}

#[tokio::test(start_paused = true)]
async fn test_second_poll_with_unchanged_list_is_silent() {
    let fake = FakeProvider::new();
    let session = session(&fake);
    session.start().await.unwrap();
    session.stop_polling();
    fake.deliver(&session.address().unwrap(), message("x", ""));
    let mut events = session.subscribe();

    assert_eq!(session.poll_once().await.unwrap(), 1);
    assert_eq!(session.poll_once().await.unwrap(), 0);

    assert_eq!(new_message_ids(&drain(&mut events)), vec!["x"]);
}

#[tokio::test(start_paused = true)]
async fn test_poll_only_looks_at_page_size_newest() {
    let fake = FakeProvider::new();
    let config = SessionConfig::builder().page_size(2).build().unwrap();
    let session = session_with(&fake, config, &SharedStore::default());
    session.start().await.unwrap();
    session.stop_polling();

    let address = session.address().unwrap();
    for id in ["a", "b", "c"] {
        fake.deliver(&address, message(id, ""));
    }

    assert_eq!(session.poll_once().await.unwrap(), 2);
    assert_eq!(snapshot_ids(&session).await, vec!["c", "b"]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_during_load_does_not_stop_the_rest() {
    let fake = FakeProvider::new();
    fake.with(|s| {
        s.seed_inbox = vec![message("3", ""), message("2", ""), message("1", "")];
        s.failing_fetches.insert("2".into());
    });
    let session = session(&fake);
    let mut events = session.subscribe();

    session.start().await.unwrap();
    session.stop_polling();

    let loaded = drain(&mut events)
        .into_iter()
        .find_map(|event| match event {
            SessionEvent::InboxLoaded { messages } => Some(messages),
            _ => None,
        })
        .expect("inbox loaded");
    let ids: Vec<_> = loaded.iter().map(|m| m.id().to_string()).collect();
    assert_eq!(ids, vec!["3", "1"]);

    // The failed message stays unknown and is picked up once it can be fetched
    fake.with(|s| s.failing_fetches.clear());
    assert_eq!(session.poll_once().await.unwrap(), 1);
    assert_eq!(new_message_ids(&drain(&mut events)), vec!["2"]);
    assert!(session.message("2").await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_failed_listing_reports_load_failure() {
    let fake = FakeProvider::new();
    let session = session(&fake);
    session.start().await.unwrap();
    session.stop_polling();
    let mut events = session.subscribe();

    fake.expire_tokens();
    let err = session.refresh().await.unwrap_err();
    assert!(err.is_unauthorized());

    let events = drain(&mut events);
    assert!(matches!(
        events.as_slice(),
        [SessionEvent::InboxLoadFailed { .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn test_background_polling_delivers_events() {
    let fake = FakeProvider::new();
    let session = session(&fake);
    session.start().await.unwrap();
    assert!(session.is_polling());
    let mut events = session.subscribe();

    fake.deliver(&session.address().unwrap(), message("bg", ""));
    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert_eq!(new_message_ids(&drain(&mut events)), vec!["bg"]);

    assert!(session.stop_polling());
    fake.deliver(&session.address().unwrap(), message("late", ""));
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_parallel_fetches_keep_arrival_order() {
    let fake = FakeProvider::new();
    let config = SessionConfig::builder().fetch_concurrency(4).build().unwrap();
    let session = session_with(&fake, config, &SharedStore::default());
    session.start().await.unwrap();
    session.stop_polling();

    let address = session.address().unwrap();
    fake.with(|s| {
        for (id, millis) in [("a", 400), ("b", 100), ("c", 300), ("d", 0)] {
            s.fetch_delays.insert(id.into(), Duration::from_millis(millis));
        }
    });
    for id in ["a", "b", "c", "d"] {
        fake.deliver(&address, message(id, ""));
    }
    let mut events = session.subscribe();

    let started = tokio::time::Instant::now();
    assert_eq!(session.poll_once().await.unwrap(), 4);

    // Overlapping fetches finish with the slowest one, not the sum
    assert!(started.elapsed() < Duration::from_millis(800));
    assert_eq!(new_message_ids(&drain(&mut events)), vec!["a", "b", "c", "d"]);
    assert_eq!(snapshot_ids(&session).await, vec!["d", "c", "b", "a"]);
}

#[tokio::test(start_paused = true)]
async fn test_poll_without_mailbox() {
    let fake = FakeProvider::new();
    let session = session(&fake);
    assert!(matches!(session.poll_once().await, Err(Error::NoMailbox)));
    assert!(matches!(session.refresh().await, Err(Error::NoMailbox)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Reset and mailbox replacement
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_reset_replaces_mailbox_and_clears_store() {
    let fake = FakeProvider::new();
    fake.with(|s| s.seed_inbox = vec![message("old", "")]);
    let store = SharedStore::default();
    let session = session_with(&fake, config(), &store);
    session.start().await.unwrap();
    let old_address = session.address().unwrap();
    assert_eq!(snapshot_ids(&session).await, vec!["old"]);

    session.reset().await.unwrap();

    let new_address = session.address().unwrap();
    assert_ne!(new_address, old_address);
    assert!(session.snapshot().await.is_empty());
    assert!(session.is_polling());

    let persisted = StateStore::new(store.clone()).load_mailbox().unwrap().unwrap();
    assert_eq!(persisted.address(), new_address);

    // The reloaded store keeps accepting messages for the new mailbox only
    fake.deliver(&new_address, message("new", ""));
    session.stop_polling();
    assert_eq!(session.poll_once().await.unwrap(), 1);
    assert_eq!(snapshot_ids(&session).await, vec!["new"]);
}

#[tokio::test(start_paused = true)]
async fn test_poll_results_for_replaced_mailbox_are_discarded() {
    let fake = FakeProvider::new();
    let session = session(&fake);
    session.start().await.unwrap();
    session.stop_polling();

    fake.deliver(&session.address().unwrap(), message("stale", ""));
    fake.with(|s| s.fetch_delay = Some(Duration::from_secs(5)));

    let polling = session.clone();
    let in_flight = tokio::spawn(async move { polling.poll_once().await });

    // Let the cycle reach the slow fetch, then swap the mailbox underneath it
    tokio::time::sleep(Duration::from_secs(1)).await;
    let mut events = session.subscribe();
    session.reset().await.unwrap();
    session.stop_polling();

    assert_eq!(in_flight.await.unwrap().unwrap(), 0);
    assert!(session.message("stale").await.is_none());
    assert!(new_message_ids(&drain(&mut events)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_initial_load_for_replaced_mailbox_is_discarded() {
    let fake = FakeProvider::new();
    fake.with(|s| {
        s.seed_inbox = vec![message("stale", "")];
        s.fetch_delay = Some(Duration::from_secs(5));
    });
    let session = session(&fake);
    let mut events = session.subscribe();

    let starting = session.clone();
    let start = tokio::spawn(async move { starting.start().await });

    // Provisioning is immediate, so the load is now waiting on the slow fetch
    tokio::time::sleep(Duration::from_secs(1)).await;
    let first_address = session.address().unwrap();
    session.reset().await.unwrap();

    start.await.unwrap().unwrap();
    session.stop_polling();

    assert_ne!(session.address().unwrap(), first_address);
    assert!(session.message("stale").await.is_none());
    assert!(session.snapshot().await.is_empty());

    let loads: Vec<Vec<String>> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::InboxLoaded { messages } => {
                Some(messages.iter().map(|m| m.id().to_string()).collect())
            }
            _ => None,
        })
        .collect();
    assert_eq!(loads, vec![Vec::<String>::new()]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth recovery
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_rejected_token_is_refreshed() {
    let fake = FakeProvider::new();
    let store = SharedStore::default();
    let session = session_with(&fake, config(), &store);
    session.start().await.unwrap();
    let before = session.mailbox().unwrap();
    let mut events = session.subscribe();

    fake.expire_tokens();
    fake.deliver(before.address(), message("after-refresh", ""));

    // First tick hits the 401 and refreshes, the second one polls with the new token
    tokio::time::sleep(Duration::from_millis(4500)).await;
    session.stop_polling();

    let after = session.mailbox().unwrap();
    assert_eq!(after.address(), before.address());
    assert_ne!(
        after.token().expose_secret(),
        before.token().expose_secret()
    );
    assert_eq!(new_message_ids(&drain(&mut events)), vec!["after-refresh"]);

    let persisted = StateStore::new(store.clone()).load_mailbox().unwrap().unwrap();
    assert_eq!(
        persisted.token().expose_secret(),
        after.token().expose_secret()
    );
}

#[tokio::test(start_paused = true)]
async fn test_rejected_credentials_reset_the_session() {
    let fake = FakeProvider::new();
    let session = session(&fake);
    session.start().await.unwrap();
    let old_address = session.address().unwrap();
    let mut events = session.subscribe();

    fake.expire_tokens();
    fake.delete_account(&old_address);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    session.stop_polling();

    let new_address = session.address().unwrap();
    assert_ne!(new_address, old_address);
    assert!(drain(&mut events).iter().any(
        |event| matches!(event, SessionEvent::MailboxReady { address } if *address == new_address)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_transient_token_refresh_failure_keeps_mailbox() {
    let fake = FakeProvider::new();
    let store = SharedStore::default();
    let session = session_with(&fake, config(), &store);
    session.start().await.unwrap();
    let address = session.address().unwrap();
    let mut events = session.subscribe();

    fake.expire_tokens();
    fake.with(|s| s.token_failures = 1);
    fake.deliver(&address, message("kept", ""));

    // 503 on the first refresh, a new token on the second tick, the message on the third
    tokio::time::sleep(Duration::from_millis(6500)).await;
    session.stop_polling();

    assert_eq!(session.address().as_deref(), Some(address.as_str()));
    assert_eq!(fake.created(), vec![address.clone()]);

    let events = drain(&mut events);
    assert!(!events
        .iter()
        .any(|event| matches!(event, SessionEvent::MailboxReady { .. })));
    assert_eq!(new_message_ids(&events), vec!["kept"]);

    let persisted = StateStore::new(store.clone()).load_mailbox().unwrap().unwrap();
    assert_eq!(persisted.address(), address);
}
