//! Internal module for building the HTTP client used against the mail API.
//!
//! Supports both direct connections and SOCKS5 proxy connections. TLS is rustls with
//! the bundled web PKI roots, so no system OpenSSL is required.

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use tracing::{debug, instrument};

/// Builds the shared HTTP client.
///
/// If a proxy is configured, every request is routed through SOCKS5 with remote DNS
/// resolution.
#[instrument(
    name = "connection::build_client",
    skip_all,
    fields(
        api_base = %config.api_base,
        proxy_enabled = config.proxy.is_some()
    )
)]
pub(crate) fn build_client(config: &SessionConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(config.timeouts.connect)
        .timeout(config.timeouts.request);

    if let Some(proxy) = &config.proxy {
        debug!(proxy = %proxy, "Routing requests via SOCKS5 proxy");
        builder = builder.proxy(proxy.to_reqwest()?);
    }

    builder
        .build()
        .map_err(|source| Error::HttpClient { source })
}
