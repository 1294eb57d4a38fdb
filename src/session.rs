//! The mailbox session: provisioning, inbox loading, polling and recovery.
//!
//! [`MailSession`] is the main entry point for this crate. It provides async methods to:
//!
//! - Restore or provision a disposable mailbox
//! - Load the full inbox and keep it current by polling
//! - Reset to a brand new mailbox
//!
//! # Example
//!
//! ```no_run
//! use tempmail_sync::{MailSession, SessionConfig, SessionEvent};
//!
//! # async fn example() -> tempmail_sync::Result<()> {
//! let session = MailSession::from_config(SessionConfig::default())?;
//! let mut events = session.subscribe();
//!
//! session.start().await?;
//! println!("Send mail to {}", session.address().unwrap_or_default());
//!
//! while let Ok(event) = events.recv().await {
//!     if let SessionEvent::NewMessage(message) = event {
//!         println!("{}: {:?}", message.notification(), message.otp());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::api::HttpProvider;
use crate::config::SessionConfig;
use crate::error::{Error, Operation, Result};
use crate::events::{EventBus, InboxMessage, SessionEvent};
use crate::model::{Mailbox, MessageFull, Theme};
use crate::poller::Poller;
use crate::provider::MailProvider;
use crate::storage::{JsonFileStore, StateStore};
use crate::store::MessageStore;
use futures::stream::{self, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

/// A disposable mailbox and its live inbox.
///
/// Cloning is cheap and every clone drives the same session. Polling stops once the
/// last clone is dropped.
///
/// # Lifecycle
///
/// 1. Create a session with [`from_config`](Self::from_config) or [`new`](Self::new)
/// 2. Call [`start`](Self::start) to restore or provision a mailbox and begin polling
/// 3. Consume [`subscribe`](Self::subscribe) events or read [`snapshot`](Self::snapshot)
/// 4. Call [`reset`](Self::reset) for a fresh address, [`stop_polling`](Self::stop_polling) when done
#[derive(Clone)]
pub struct MailSession {
    inner: Arc<Inner>,
}

struct Inner {
    provider: Arc<dyn MailProvider>,
    config: SessionConfig,
    state: StateStore,
    active: RwLock<Active>,
    store: tokio::sync::Mutex<MessageStore>,
    poller: Mutex<Poller>,
    events: EventBus,
}

/// The active mailbox and the generation it belongs to.
///
/// The generation is bumped, under the store lock, every time the mailbox is replaced
/// or discarded. A cycle captures it up front and drops its results on mismatch.
#[derive(Default)]
struct Active {
    mailbox: Option<Mailbox>,
    generation: u64,
}

impl std::fmt::Debug for MailSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailSession")
            .field("address", &self.address())
            .field("polling", &self.is_polling())
            .finish_non_exhaustive()
    }
}

impl MailSession {
    /// Creates a session over an arbitrary provider and state store.
    #[must_use]
    pub fn new(provider: Arc<dyn MailProvider>, config: SessionConfig, state: StateStore) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            inner: Arc::new(Inner {
                provider,
                config,
                state,
                active: RwLock::new(Active::default()),
                store: tokio::sync::Mutex::new(MessageStore::new()),
                poller: Mutex::new(Poller::new()),
                events,
            }),
        }
    }

    /// Creates a session talking HTTP to `config.api_base`.
    ///
    /// State is persisted to `config.state_path`, or kept in memory if it is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the state file exists but
    /// cannot be read.
    pub fn from_config(config: SessionConfig) -> Result<Self> {
        let provider = HttpProvider::new(config.clone())?;
        let state = match &config.state_path {
            Some(path) => StateStore::new(JsonFileStore::open(path)?),
            None => StateStore::in_memory(),
        };
        Ok(Self::new(Arc::new(provider), config, state))
    }

    /// Subscribes to session events.
    ///
    /// Only events emitted after this call are received.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Returns the active mailbox.
    #[must_use]
    pub fn mailbox(&self) -> Option<Mailbox> {
        read(&self.inner.active).mailbox.clone()
    }

    /// Returns the active mailbox address.
    #[must_use]
    pub fn address(&self) -> Option<String> {
        read(&self.inner.active)
            .mailbox
            .as_ref()
            .map(|mailbox| mailbox.address().to_string())
    }

    /// Returns every stored message, newest first.
    pub async fn snapshot(&self) -> Vec<InboxMessage> {
        let store = self.inner.store.lock().await;
        store.iter().cloned().map(InboxMessage::new).collect()
    }

    /// Returns one stored message.
    pub async fn message(&self, id: &str) -> Option<InboxMessage> {
        let store = self.inner.store.lock().await;
        store.get(id).cloned().map(InboxMessage::new)
    }

    /// Returns the persisted theme preference.
    ///
    /// # Errors
    ///
    /// Returns an error if the state store cannot be read.
    pub fn theme(&self) -> Result<Theme> {
        self.inner.state.load_theme()
    }

    /// Switches between light and dark and persists the choice.
    ///
    /// # Errors
    ///
    /// Returns an error if the state store cannot be read or written.
    pub fn toggle_theme(&self) -> Result<Theme> {
        let theme = self.inner.state.load_theme()?.toggled();
        self.inner.state.save_theme(theme)?;
        debug!(%theme, "Theme toggled");
        Ok(theme)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Restores the persisted mailbox or provisions a new one, loads the inbox and
    /// starts polling.
    ///
    /// A failed initial load is reported as [`SessionEvent::InboxLoadFailed`] and does
    /// not prevent polling.
    ///
    /// # Errors
    ///
    /// Returns an error if the state store cannot be read, or provisioning gives up
    /// (only when `max_attempts` is configured).
    #[instrument(name = "MailSession::start", skip_all)]
    pub async fn start(&self) -> Result<()> {
        match self.inner.state.load_mailbox()? {
            Some(mailbox) => {
                info!(address = %mailbox.address(), "Restored persisted mailbox");
                self.activate(mailbox).await?;
            }
            None => {
                self.provision().await?;
            }
        }

        self.load_and_poll().await;
        Ok(())
    }

    /// Discards the current mailbox and starts over with a new one.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted state cannot be cleared, or provisioning gives
    /// up (only when `max_attempts` is configured).
    #[instrument(name = "MailSession::reset", skip_all)]
    pub async fn reset(&self) -> Result<()> {
        info!("Resetting mailbox");

        self.stop_polling();
        self.deactivate().await?;
        self.provision().await?;

        self.load_and_poll().await;
        Ok(())
    }

    /// Provisions a mailbox, retrying after a fixed delay until it succeeds.
    ///
    /// Every failed attempt that will be retried emits
    /// [`SessionEvent::ProvisioningFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProvisioningExhausted`] once `max_attempts` attempts have failed.
    /// Without `max_attempts` this never returns an error.
    #[instrument(name = "MailSession::provision", skip_all)]
    pub async fn provision(&self) -> Result<Mailbox> {
        let retry_delay = self.inner.config.provisioning.retry_delay;
        let max_attempts = self.inner.config.provisioning.max_attempts;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match self.create_mailbox().await {
                Ok(mailbox) => return Ok(mailbox),
                Err(e) if max_attempts.is_some_and(|max| attempt >= max) => {
                    warn!(attempt, error = %e, "Giving up on mailbox provisioning");
                    return Err(Error::ProvisioningExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        category = %e.category(),
                        retry_in_ms = retry_delay.as_millis(),
                        "Mailbox provisioning failed"
                    );
                    self.inner.events.emit(SessionEvent::ProvisioningFailed {
                        reason: e.to_string(),
                        retry_in: retry_delay,
                    });
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }

    /// Makes one provisioning attempt and activates the resulting mailbox.
    ///
    /// Picks the first listed domain, a random local part and a random password,
    /// registers the account and exchanges the credentials for a token.
    ///
    /// # Errors
    ///
    /// Returns the first provider or persistence error.
    #[instrument(name = "MailSession::create_mailbox", skip_all)]
    pub async fn create_mailbox(&self) -> Result<Mailbox> {
        let provider = &self.inner.provider;

        let domain = provider
            .domains()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::NoDomains)?;

        let local_part = random_local_part(self.inner.config.provisioning.local_part_len);
        let address = format!("{local_part}@{}", domain.domain);
        let password = Uuid::new_v4().simple().to_string();

        debug!(%address, "Creating account");
        provider.create_account(&address, &password).await?;
        let token = provider.issue_token(&address, &password).await?;

        let mailbox = Mailbox::new(&address, password, token.expose_secret())?;
        self.inner.state.save_mailbox(&mailbox)?;
        self.activate(mailbox.clone()).await?;

        Ok(mailbox)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbox
    // ─────────────────────────────────────────────────────────────────────────

    /// Reloads the whole inbox, replacing the stored messages.
    ///
    /// Messages whose fetch fails are skipped. Emits [`SessionEvent::InboxLoaded`] on
    /// success and [`SessionEvent::InboxLoadFailed`] if the listing itself fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMailbox`] before a mailbox exists, or the listing error.
    #[instrument(name = "MailSession::refresh", skip_all)]
    pub async fn refresh(&self) -> Result<Vec<InboxMessage>> {
        match self.load_inbox().await {
            Ok(Some(messages)) => {
                info!(count = messages.len(), "Inbox loaded");
                self.inner.events.emit(SessionEvent::InboxLoaded {
                    messages: messages.clone(),
                });
                Ok(messages)
            }
            Ok(None) => Ok(Vec::new()),
            Err(e) => {
                warn!(error = %e, category = %e.category(), "Inbox load failed");
                self.inner.events.emit(SessionEvent::InboxLoadFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Runs one poll cycle and returns how many new messages were stored.
    ///
    /// Requests the `page_size` most recent summaries, fetches the unknown ones oldest
    /// first and emits [`SessionEvent::NewMessage`] for each stored message. A message
    /// whose fetch fails stays unknown and is retried by the next cycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMailbox`] before a mailbox exists, or the listing error.
    #[instrument(name = "MailSession::poll_once", skip_all)]
    pub async fn poll_once(&self) -> Result<usize> {
        let (generation, mailbox) = self.current()?;

        let polled = self
            .inner
            .provider
            .list_messages(mailbox.token(), Some(self.inner.config.polling.page_size))
            .await?;

        let fresh: Vec<String> = {
            let store = self.inner.store.lock().await;
            store
                .compute_new_messages(&polled)
                .into_iter()
                .map(|summary| summary.id.clone())
                .collect()
        };

        if fresh.is_empty() {
            trace!(polled = polled.len(), "No new messages");
            return Ok(0);
        }

        debug!(count = fresh.len(), "New messages found");
        let fetched = self.fetch_all(mailbox.token(), fresh).await;

        let mut store = self.inner.store.lock().await;
        if self.generation() != generation {
            debug!("Discarding poll results for a replaced mailbox");
            return Ok(0);
        }

        let mut added = 0;
        for message in fetched {
            if store.prepend(message.clone()) {
                added += 1;
                let message = InboxMessage::new(message);
                info!(message_id = %message.id(), from = %message.from(), "New message");
                self.inner.events.emit(SessionEvent::NewMessage(message));
            }
        }

        Ok(added)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Polling
    // ─────────────────────────────────────────────────────────────────────────

    /// Starts polling every `polling.interval`, replacing any running poller.
    ///
    /// Cycle errors are logged and never stop later cycles. A rejected token triggers a
    /// token refresh, and a reset if the credentials themselves are rejected.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_polling(&self) {
        let session = Arc::downgrade(&self.inner);
        let interval = self.inner.config.polling.interval;

        lock(&self.inner.poller).start(interval, move || {
            let session = session.clone();
            async move {
                if let Some(inner) = session.upgrade() {
                    MailSession { inner }.poll_tick().await;
                }
            }
        });
    }

    /// Stops polling. Returns `true` if a poller was running.
    ///
    /// A cycle already in flight runs to completion.
    pub fn stop_polling(&self) -> bool {
        lock(&self.inner.poller).stop()
    }

    /// Returns `true` while polling is active.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        lock(&self.inner.poller).is_running()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Private methods
    // ─────────────────────────────────────────────────────────────────────────

    async fn poll_tick(&self) {
        match self.poll_once().await {
            Ok(_) => {}
            Err(e) if e.is_unauthorized() => self.recover_auth().await,
            Err(e) => warn!(error = %e, category = %e.category(), "Poll cycle failed"),
        }
    }

    /// Exchanges the stored credentials for a new token.
    ///
    /// Only a rejection of the credentials themselves resets the session. Any other
    /// failure leaves the mailbox in place for the next cycle to retry.
    #[instrument(name = "MailSession::recover_auth", skip_all)]
    async fn recover_auth(&self) {
        let Ok((generation, mailbox)) = self.current() else {
            return;
        };

        warn!("Token rejected, requesting a new one");
        match self
            .inner
            .provider
            .issue_token(mailbox.address(), mailbox.password())
            .await
        {
            Ok(token) => {
                if let Err(e) = self.replace_token(generation, mailbox, token).await {
                    warn!(error = %e, "Failed to persist refreshed token");
                }
            }
            Err(e) if credentials_rejected(&e) => {
                if self.generation() != generation {
                    debug!("Mailbox already replaced, skipping reset");
                    return;
                }
                warn!(error = %e, "Mailbox is unrecoverable, starting over");
                if let Err(e) = self.reset().await {
                    warn!(error = %e, "Reset after auth failure failed");
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    category = %e.category(),
                    "Token refresh failed, retrying next cycle"
                );
            }
        }
    }

    async fn replace_token(
        &self,
        generation: u64,
        mailbox: Mailbox,
        token: SecretString,
    ) -> Result<()> {
        let _store = self.inner.store.lock().await;
        if self.generation() != generation {
            debug!("Discarding token for a replaced mailbox");
            return Ok(());
        }

        let mailbox = mailbox.with_token(token);
        self.inner.state.save_mailbox(&mailbox)?;
        write(&self.inner.active).mailbox = Some(mailbox);

        info!("Token refreshed");
        Ok(())
    }

    async fn load_and_poll(&self) {
        if let Err(e) = self.refresh().await {
            debug!(error = %e, "Polling despite failed initial load");
        }
        self.start_polling();
    }

    /// Loads every listed message. `None` means the mailbox was replaced meanwhile.
    async fn load_inbox(&self) -> Result<Option<Vec<InboxMessage>>> {
        let (generation, mailbox) = self.current()?;

        let summaries = self
            .inner
            .provider
            .list_messages(mailbox.token(), None)
            .await?;

        let ids = summaries.into_iter().map(|summary| summary.id).collect();
        let fetched = self.fetch_all(mailbox.token(), ids).await;

        let mut store = self.inner.store.lock().await;
        if self.generation() != generation {
            debug!("Discarding inbox load for a replaced mailbox");
            return Ok(None);
        }

        store.clear();
        let mut messages = Vec::with_capacity(fetched.len());
        for message in fetched {
            if store.append(message.clone()) {
                messages.push(InboxMessage::new(message));
            }
        }

        Ok(Some(messages))
    }

    /// Fetches `ids` with bounded concurrency, keeping input order and dropping failures.
    async fn fetch_all(&self, token: &SecretString, ids: Vec<String>) -> Vec<MessageFull> {
        let provider = &self.inner.provider;

        stream::iter(ids)
            .map(|id| async move {
                let result = provider.fetch_message(token, &id).await;
                (id, result)
            })
            .buffered(self.inner.config.polling.fetch_concurrency)
            .filter_map(|(id, result)| async move {
                match result {
                    Ok(message) => Some(message),
                    Err(e) => {
                        debug!(message_id = %id, error = %e, "Skipping message that failed to fetch");
                        None
                    }
                }
            })
            .collect()
            .await
    }

    /// Makes `mailbox` the active one and empties the store.
    async fn activate(&self, mailbox: Mailbox) -> Result<()> {
        let address = mailbox.address().to_string();

        {
            let mut store = self.inner.store.lock().await;
            store.clear();
            let mut active = write(&self.inner.active);
            active.mailbox = Some(mailbox);
            active.generation += 1;
        }

        info!(%address, "Mailbox ready");
        self.inner
            .events
            .emit(SessionEvent::MailboxReady { address });
        Ok(())
    }

    /// Forgets the active mailbox, in memory and on disk.
    async fn deactivate(&self) -> Result<()> {
        {
            let mut store = self.inner.store.lock().await;
            store.clear();
            let mut active = write(&self.inner.active);
            active.mailbox = None;
            active.generation += 1;
        }

        self.inner.state.clear_mailbox()
    }

    fn current(&self) -> Result<(u64, Mailbox)> {
        let active = read(&self.inner.active);
        let mailbox = active.mailbox.clone().ok_or(Error::NoMailbox)?;
        Ok((active.generation, mailbox))
    }

    fn generation(&self) -> u64 {
        read(&self.inner.active).generation
    }
}

/// The provider refused the account's credentials, not just the current token.
fn credentials_rejected(error: &Error) -> bool {
    error.is_unauthorized() && error.operation().is_some_and(Operation::is_provisioning)
}

/// Random lowercase alphanumeric local part.
fn random_local_part(len: usize) -> String {
    Uuid::new_v4().simple().to_string().chars().take(len).collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(rw: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    rw.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(rw: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    rw.write().unwrap_or_else(PoisonError::into_inner)
}
