//! Key-value persistence of the mailbox credentials and the theme preference.
//!
//! Two backends are provided: [`JsonFileStore`] keeps a single JSON object on disk,
//! [`MemoryStore`] keeps nothing beyond the process. [`StateStore`] layers the typed
//! accessors used by the session on top of either.

use crate::error::{Error, Result};
use crate::model::{Mailbox, Theme};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

const MAIL_ACCOUNT_KEY: &str = "mail_account";
const MAIL_TOKEN_KEY: &str = "mail_token";
const THEME_KEY: &str = "theme";

/// String key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Deletes `key`. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

/// Storage backed by one JSON object file, rewritten atomically on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Opens the store at `path`. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is not a JSON object
    /// of strings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| Error::StateFormat {
                key: path.display().to_string(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No state file yet");
                BTreeMap::new()
            }
            Err(source) => return Err(Error::StateIo { path, source }),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let io_err = |source| Error::StateIo {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(entries).map_err(|source| Error::StateFormat {
            key: self.path.display().to_string(),
            source,
        })?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = lock(&self.entries);
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = lock(&self.entries);
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Serialize, Deserialize)]
struct StoredAccount {
    address: String,
    password: String,
}

/// Typed access to the persisted session state.
pub struct StateStore {
    backend: Box<dyn KeyValueStore>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore").finish_non_exhaustive()
    }
}

impl StateStore {
    /// Wraps a key-value backend.
    #[must_use]
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Creates a store that persists nothing.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// Loads the persisted mailbox.
    ///
    /// Returns `None` unless both the account and its token are present. An account
    /// that no longer parses is treated as absent so a fresh one gets provisioned.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn load_mailbox(&self) -> Result<Option<Mailbox>> {
        let (Some(account), Some(token)) = (
            self.backend.get(MAIL_ACCOUNT_KEY)?,
            self.backend.get(MAIL_TOKEN_KEY)?,
        ) else {
            return Ok(None);
        };

        let account: StoredAccount = match serde_json::from_str(&account) {
            Ok(account) => account,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed persisted account");
                return Ok(None);
            }
        };

        match Mailbox::new(&account.address, account.password, token) {
            Ok(mailbox) => Ok(Some(mailbox)),
            Err(e) => {
                warn!(error = %e, "Ignoring persisted account with invalid address");
                Ok(None)
            }
        }
    }

    /// Persists `mailbox`, overwriting any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn save_mailbox(&self, mailbox: &Mailbox) -> Result<()> {
        let account = StoredAccount {
            address: mailbox.address().to_string(),
            password: mailbox.password().to_string(),
        };
        let account = serde_json::to_string(&account).map_err(|source| Error::StateFormat {
            key: MAIL_ACCOUNT_KEY.into(),
            source,
        })?;

        self.backend.set(MAIL_ACCOUNT_KEY, &account)?;
        self.backend
            .set(MAIL_TOKEN_KEY, mailbox.token().expose_secret())
    }

    /// Deletes the persisted mailbox and token.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn clear_mailbox(&self) -> Result<()> {
        self.backend.remove(MAIL_ACCOUNT_KEY)?;
        self.backend.remove(MAIL_TOKEN_KEY)
    }

    /// Loads the theme preference, defaulting to [`Theme::Light`].
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn load_theme(&self) -> Result<Theme> {
        Ok(self
            .backend
            .get(THEME_KEY)?
            .and_then(|name| Theme::parse(&name))
            .unwrap_or_default())
    }

    /// Persists the theme preference.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn save_theme(&self, theme: Theme) -> Result<()> {
        self.backend.set(THEME_KEY, theme.as_str())
    }
}
