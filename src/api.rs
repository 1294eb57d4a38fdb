//! Internal module wrapping the mail.tm REST API.
//!
//! Every call maps transport failures, timeouts, rejected tokens and unexpected
//! statuses onto [`Error`] variants tagged with the [`Operation`] that produced them.

use crate::config::SessionConfig;
use crate::connection;
use crate::error::{Error, Operation, Result};
use crate::model::{Collection, Credentials, Domain, MessageFull, MessageSummary, TokenResponse};
use crate::provider::MailProvider;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, trace};
use url::Url;

/// Longest response body excerpt kept in [`Error::Status`].
const MAX_ERROR_BODY_CHARS: usize = 200;

/// [`MailProvider`] backed by a mail.tm-compatible HTTP API.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    config: SessionConfig,
}

impl HttpProvider {
    /// Creates a provider with its own HTTP client built from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy is unusable or the client cannot be built.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let client = connection::build_client(&config)?;
        Ok(Self { client, config })
    }

    /// Creates a provider sharing an existing HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: SessionConfig) -> Self {
        Self { client, config }
    }

    fn messages_url(&self, limit: Option<usize>) -> Result<Url> {
        let mut url = self.config.endpoint("messages")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("sort", "createdAt");
            query.append_pair("order", "desc");
            if let Some(limit) = limit {
                query.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }

    fn message_url(&self, id: &str) -> Result<Url> {
        let mut url = self.config.endpoint("messages")?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidConfig {
                message: format!("API base {} cannot hold a path", self.config.api_base),
            })?
            .push(id);
        Ok(url)
    }

    /// Sends `request` and rejects anything but a 2xx response.
    async fn execute(&self, operation: Operation, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|source| Error::from_reqwest(operation, source))?;

        let status = response.status();
        trace!(%operation, status = status.as_u16(), "Provider responded");

        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized { operation });
        }

        if !status.is_success() {
            // The body is diagnostic only; losing it is not worth a second error
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status {
                operation,
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        Ok(response)
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<T> {
        self.execute(operation, request)
            .await?
            .json::<T>()
            .await
            .map_err(|source| Error::from_reqwest(operation, source))
    }
}

#[async_trait]
impl MailProvider for HttpProvider {
    #[instrument(name = "api::domains", skip_all)]
    async fn domains(&self) -> Result<Vec<Domain>> {
        let url = self.config.endpoint("domains")?;
        let domains = self
            .fetch_json::<Collection<Domain>>(Operation::ListDomains, self.client.get(url))
            .await?
            .into_vec();

        debug!(count = domains.len(), "Listed domains");
        Ok(domains)
    }

    #[instrument(name = "api::create_account", skip_all, fields(address = %address))]
    async fn create_account(&self, address: &str, password: &str) -> Result<()> {
        let url = self.config.endpoint("accounts")?;
        let request = self
            .client
            .post(url)
            .json(&Credentials { address, password });

        self.execute(Operation::CreateAccount, request).await?;
        debug!("Account created");
        Ok(())
    }

    #[instrument(name = "api::issue_token", skip_all, fields(address = %address))]
    async fn issue_token(&self, address: &str, password: &str) -> Result<SecretString> {
        let url = self.config.endpoint("token")?;
        let request = self
            .client
            .post(url)
            .json(&Credentials { address, password });

        let response: TokenResponse = self.fetch_json(Operation::IssueToken, request).await?;
        debug!("Token issued");
        Ok(SecretString::from(response.token))
    }

    #[instrument(name = "api::list_messages", skip_all, fields(limit = ?limit))]
    async fn list_messages(
        &self,
        token: &SecretString,
        limit: Option<usize>,
    ) -> Result<Vec<MessageSummary>> {
        let request = self
            .client
            .get(self.messages_url(limit)?)
            .bearer_auth(token.expose_secret());

        let mut messages = self
            .fetch_json::<Collection<MessageSummary>>(Operation::ListMessages, request)
            .await?
            .into_vec();

        // The limit is a hint some deployments ignore
        if let Some(limit) = limit {
            messages.truncate(limit);
        }

        debug!(count = messages.len(), "Listed messages");
        Ok(messages)
    }

    #[instrument(name = "api::fetch_message", skip_all, fields(message_id = %id))]
    async fn fetch_message(&self, token: &SecretString, id: &str) -> Result<MessageFull> {
        let request = self
            .client
            .get(self.message_url(id)?)
            .bearer_auth(token.expose_secret());

        self.fetch_json(Operation::FetchMessage, request).await
    }
}

fn truncate_body(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
