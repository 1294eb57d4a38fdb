//! The mail provider seam.
//!
//! [`MailProvider`] is everything the session needs from a disposable-mail service.
//! [`HttpProvider`](crate::HttpProvider) talks to a mail.tm-compatible API; tests
//! substitute an in-memory implementation.

use crate::error::Result;
use crate::model::{Domain, MessageFull, MessageSummary};
use async_trait::async_trait;
use secrecy::SecretString;

/// Operations offered by a disposable-mail service.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Lists the domains accounts can be created on.
    async fn domains(&self) -> Result<Vec<Domain>>;

    /// Registers `address` with `password`.
    async fn create_account(&self, address: &str, password: &str) -> Result<()>;

    /// Exchanges credentials for a bearer token.
    async fn issue_token(&self, address: &str, password: &str) -> Result<SecretString>;

    /// Lists messages newest first. `limit` caps the number returned.
    async fn list_messages(
        &self,
        token: &SecretString,
        limit: Option<usize>,
    ) -> Result<Vec<MessageSummary>>;

    /// Fetches one message with its bodies.
    async fn fetch_message(&self, token: &SecretString, id: &str) -> Result<MessageFull>;
}
