//! Data types exchanged with the mail provider and persisted between runs.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use email_address::EmailAddress;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};

/// A provisioned disposable mailbox: address, password and bearer token.
///
/// The password and token are kept as [`SecretString`]s and redacted from `Debug` output.
#[derive(Clone)]
pub struct Mailbox {
    address: EmailAddress,
    password: SecretString,
    token: SecretString,
}

impl Mailbox {
    /// Creates a mailbox from credentials and an issued token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if `address` is not a valid email address.
    pub fn new(
        address: &str,
        password: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            address: validate_address(address)?,
            password: SecretString::from(password.into()),
            token: SecretString::from(token.into()),
        })
    }

    /// Returns the email address.
    #[must_use]
    pub fn address(&self) -> &str {
        self.address.as_str()
    }

    /// Returns the account password.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Returns the bearer token.
    #[must_use]
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    /// Returns the same mailbox with a freshly issued token.
    #[must_use]
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = token;
        self
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("address", &self.address.as_str())
            .field("password", &"[REDACTED]")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

fn validate_address(address: &str) -> Result<EmailAddress> {
    EmailAddress::parse_with_options(address, email_address::Options::default()).map_err(|_| {
        Error::InvalidAddress {
            address: address.to_string(),
        }
    })
}

/// A domain the provider accepts new accounts on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    /// The domain name, e.g. `example.com`.
    pub domain: String,
    /// Whether new accounts may be created on it.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Sender of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Sender email address.
    #[serde(default, deserialize_with = "null_as_default")]
    pub address: String,
    /// Display name, if any.
    #[serde(default)]
    pub name: Option<String>,
}

/// Minimal message data returned by a listing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    /// Provider message identifier.
    pub id: String,
    /// Sender, if the provider reported one.
    #[serde(default)]
    pub from: Option<Sender>,
    /// Subject line (empty if absent).
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: String,
    /// When the provider received the message.
    pub created_at: DateTime<Utc>,
}

impl MessageSummary {
    /// Returns the sender address, or `"unknown"`.
    #[must_use]
    pub fn sender(&self) -> &str {
        match &self.from {
            Some(from) if !from.address.is_empty() => &from.address,
            _ => "unknown",
        }
    }

    /// Returns the subject, or `"(no subject)"`.
    #[must_use]
    pub fn display_subject(&self) -> &str {
        if self.subject.is_empty() {
            "(no subject)"
        } else {
            &self.subject
        }
    }
}

/// A message with its bodies, fetched individually by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageFull {
    /// Listing data.
    #[serde(flatten)]
    pub summary: MessageSummary,
    /// Plain-text body (empty if absent).
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    /// HTML body (empty if absent). Multi-part HTML bodies are concatenated.
    #[serde(default, deserialize_with = "html_body")]
    pub html: String,
}

impl MessageFull {
    /// Returns the message id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.summary.id
    }
}

/// Color theme preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light theme.
    #[default]
    Light,
    /// Dark theme.
    Dark,
}

impl Theme {
    /// Returns the other theme.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    /// Returns the persisted name of the theme.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    /// Parses a persisted theme name. Unknown names yield `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire helpers
// ─────────────────────────────────────────────────────────────────────────────

/// A provider collection, either Hydra JSON-LD or a plain JSON array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Collection<T> {
    Hydra {
        #[serde(rename = "hydra:member", default = "Vec::new")]
        members: Vec<T>,
    },
    Plain(Vec<T>),
}

impl<T> Collection<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            Collection::Hydra { members } => members,
            Collection::Plain(items) => items,
        }
    }
}

/// Body of `POST /accounts` and `POST /token`.
#[derive(Debug, Serialize)]
pub(crate) struct Credentials<'a> {
    pub address: &'a str,
    pub password: &'a str,
}

/// Response of `POST /token`.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub token: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn html_body<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Html {
        One(String),
        Parts(Vec<String>),
    }

    Ok(match Option::<Html>::deserialize(deserializer)? {
        Some(Html::One(body)) => body,
        Some(Html::Parts(parts)) => parts.concat(),
        None => String::new(),
    })
}
