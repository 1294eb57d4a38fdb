//! SOCKS5 proxy configuration for provider requests.
//!
//! Requests to the mail API can be routed through a SOCKS5 proxy. Host names are
//! resolved by the proxy (`socks5h`), so the provider's address never hits the local resolver.
//!
//! # Example
//!
//! ```
//! use tempmail_sync::Socks5Proxy;
//!
//! // Without authentication
//! let proxy = Socks5Proxy::new("proxy.example.com", 1080);
//!
//! // With authentication
//! let proxy = Socks5Proxy::with_auth("proxy.example.com", 1080, "username", "password");
//! ```

use crate::error::{Error, Result};
use url::Url;

/// SOCKS5 proxy configuration.
#[derive(Debug, Clone)]
pub struct Socks5Proxy {
    /// Proxy server hostname or IP address.
    pub host: String,
    /// Proxy server port.
    pub port: u16,
    /// Optional authentication credentials.
    pub auth: Option<ProxyAuth>,
}

/// Authentication credentials for SOCKS5 proxy.
#[derive(Clone)]
pub struct ProxyAuth {
    /// Username for proxy authentication.
    pub username: String,
    /// Password for proxy authentication.
    pub password: String,
}

impl Socks5Proxy {
    /// Creates a new SOCKS5 proxy configuration without authentication.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            auth: None,
        }
    }

    /// Creates a new SOCKS5 proxy configuration with authentication.
    #[must_use]
    pub fn with_auth(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            auth: Some(ProxyAuth {
                username: username.into(),
                password: password.into(),
            }),
        }
    }

    /// Returns the proxy address as "host:port".
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns `true` if this proxy requires authentication.
    #[must_use]
    pub fn requires_auth(&self) -> bool {
        self.auth.is_some()
    }

    /// Returns the proxy URL including credentials, as understood by reqwest.
    ///
    /// Credentials are percent-encoded. Never log this value; use the `Display` impl instead.
    pub(crate) fn to_url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!("socks5h://{}", self.address())).map_err(|e| {
            Error::InvalidConfig {
                message: format!("invalid proxy address {}: {e}", self.address()),
            }
        })?;

        if let Some(auth) = &self.auth {
            let rejected = || Error::InvalidConfig {
                message: format!("proxy {self} does not accept credentials"),
            };
            url.set_username(&auth.username).map_err(|()| rejected())?;
            url.set_password(Some(&auth.password))
                .map_err(|()| rejected())?;
        }

        Ok(url)
    }

    /// Builds the reqwest proxy that routes all requests through this server.
    pub(crate) fn to_reqwest(&self) -> Result<reqwest::Proxy> {
        let url = self.to_url()?;
        reqwest::Proxy::all(url.as_str()).map_err(|source| Error::InvalidProxy {
            proxy: self.to_string(),
            source,
        })
    }
}

impl std::fmt::Debug for ProxyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl std::fmt::Display for Socks5Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.auth {
            Some(auth) => write!(
                f,
                "socks5://{}:***@{}:{}",
                auth.username, self.host, self.port
            ),
            None => write!(f, "socks5://{}:{}", self.host, self.port),
        }
    }
}
