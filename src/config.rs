//! Configuration for the mailbox session.
//!
//! Use [`SessionConfigBuilder`] to create a configuration with sensible defaults:
//!
//! ```
//! use tempmail_sync::SessionConfig;
//! use std::time::Duration;
//!
//! let config = SessionConfig::builder()
//!     .poll_interval(Duration::from_secs(5))
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.api_base.as_str(), "https://api.mail.tm/");
//! ```

use crate::error::{Error, Result};
use crate::proxy::Socks5Proxy;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default mail API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.mail.tm";

/// Configuration for a [`MailSession`](crate::MailSession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the mail API.
    pub api_base: Url,
    /// Optional SOCKS5 proxy for all provider requests.
    pub proxy: Option<Socks5Proxy>,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
    /// Inbox polling configuration.
    pub polling: PollingConfig,
    /// Mailbox provisioning configuration.
    pub provisioning: ProvisioningConfig,
    /// Where mailbox credentials and preferences are persisted.
    ///
    /// Defaults to [`SessionConfig::default_state_path`]. `None` keeps state in memory
    /// only.
    pub state_path: Option<PathBuf>,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

/// Timeout configuration for provider requests.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing the TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for a whole request, connection included.
    pub request: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            request: Duration::from_secs(30),
        }
    }
}

/// Polling configuration.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Interval between poll cycles.
    pub interval: Duration,
    /// Number of most recent messages requested per poll cycle.
    ///
    /// More arrivals than this within one interval are missed by that cycle.
    pub page_size: usize,
    /// How many full-message fetches may be in flight at once within a cycle.
    pub fetch_concurrency: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            page_size: 10,
            fetch_concurrency: 1,
        }
    }
}

/// Mailbox provisioning configuration.
#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    /// Fixed delay before retrying a failed provisioning attempt.
    pub retry_delay: Duration,
    /// Give up after this many attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Length of the randomly generated local part of the address.
    pub local_part_len: usize,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(1500),
            max_attempts: None,
            local_part_len: 8,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            proxy: None,
            user_agent: default_user_agent(),
            timeouts: TimeoutConfig::default(),
            polling: PollingConfig::default(),
            provisioning: ProvisioningConfig::default(),
            state_path: Self::default_state_path(),
            event_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Returns the platform default location for persisted state, if the platform has one.
    #[must_use]
    pub fn default_state_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("tempmail-sync").join("state.json"))
    }

    /// Resolves `path` (e.g. `"messages/abc"`) against the API base.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_base.join(path).map_err(|e| Error::InvalidConfig {
            message: format!("cannot build endpoint '{path}': {e}"),
        })
    }
}

fn default_api_base() -> Url {
    Url::parse(DEFAULT_API_BASE).expect("default API base is a valid URL")
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    api_base: Option<String>,
    proxy: Option<Socks5Proxy>,
    user_agent: Option<String>,
    timeouts: Option<TimeoutConfig>,
    polling: Option<PollingConfig>,
    provisioning: Option<ProvisioningConfig>,
    state_path: Option<PathBuf>,
    in_memory: bool,
    event_capacity: Option<usize>,
}

impl SessionConfigBuilder {
    /// Sets the mail API base URL. Default is [`DEFAULT_API_BASE`].
    #[must_use]
    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    /// Sets a SOCKS5 proxy for all provider requests.
    #[must_use]
    pub fn proxy(mut self, proxy: Socks5Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Sets the `User-Agent` header.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .connect = timeout;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .request = timeout;
        self
    }

    /// Sets polling configuration.
    #[must_use]
    pub fn polling(mut self, polling: PollingConfig) -> Self {
        self.polling = Some(polling);
        self
    }

    /// Sets the interval between poll cycles.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.polling
            .get_or_insert_with(PollingConfig::default)
            .interval = interval;
        self
    }

    /// Sets how many recent messages a poll cycle requests.
    #[must_use]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.polling
            .get_or_insert_with(PollingConfig::default)
            .page_size = page_size;
        self
    }

    /// Sets how many full-message fetches may run concurrently.
    #[must_use]
    pub fn fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.polling
            .get_or_insert_with(PollingConfig::default)
            .fetch_concurrency = concurrency;
        self
    }

    /// Sets provisioning configuration.
    #[must_use]
    pub fn provisioning(mut self, provisioning: ProvisioningConfig) -> Self {
        self.provisioning = Some(provisioning);
        self
    }

    /// Sets the fixed delay between provisioning attempts.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.provisioning
            .get_or_insert_with(ProvisioningConfig::default)
            .retry_delay = delay;
        self
    }

    /// Caps the number of provisioning attempts.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.provisioning
            .get_or_insert_with(ProvisioningConfig::default)
            .max_attempts = Some(attempts);
        self
    }

    /// Persists state to `path` instead of [`SessionConfig::default_state_path`].
    #[must_use]
    pub fn state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self.in_memory = false;
        self
    }

    /// Keeps state in memory only, so nothing survives the process.
    ///
    /// Overrides an earlier [`state_path`](Self::state_path) and is overridden by a
    /// later one.
    #[must_use]
    pub fn in_memory(mut self) -> Self {
        self.state_path = None;
        self.in_memory = true;
        self
    }

    /// Sets the event channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a value is out of range or the API base is not
    /// an `http(s)` URL.
    pub fn build(self) -> Result<SessionConfig> {
        let api_base = match self.api_base {
            Some(raw) => parse_api_base(&raw)?,
            None => default_api_base(),
        };

        let polling = self.polling.unwrap_or_default();
        if polling.interval.is_zero() {
            return Err(invalid("poll interval must be greater than zero"));
        }
        if polling.page_size == 0 {
            return Err(invalid("page size must be greater than zero"));
        }
        if polling.fetch_concurrency == 0 {
            return Err(invalid("fetch concurrency must be greater than zero"));
        }

        let provisioning = self.provisioning.unwrap_or_default();
        if provisioning.max_attempts == Some(0) {
            return Err(invalid("max attempts must be greater than zero"));
        }
        if provisioning.local_part_len == 0 || provisioning.local_part_len > 32 {
            return Err(invalid("local part length must be between 1 and 32"));
        }

        let event_capacity = self.event_capacity.unwrap_or(64);
        if event_capacity == 0 {
            return Err(invalid("event capacity must be greater than zero"));
        }

        let state_path = if self.in_memory {
            None
        } else {
            self.state_path.or_else(SessionConfig::default_state_path)
        };

        Ok(SessionConfig {
            api_base,
            proxy: self.proxy,
            user_agent: self.user_agent.unwrap_or_else(default_user_agent),
            timeouts: self.timeouts.unwrap_or_default(),
            polling,
            provisioning,
            state_path,
            event_capacity,
        })
    }
}

fn invalid(message: &str) -> Error {
    Error::InvalidConfig {
        message: message.into(),
    }
}

/// Parses the API base, forcing a trailing slash so relative joins keep the path prefix.
fn parse_api_base(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw).map_err(|e| Error::InvalidConfig {
        message: format!("invalid API base '{raw}': {e}"),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidConfig {
            message: format!("API base must be http(s), got '{}'", url.scheme()),
        });
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = SessionConfig::builder().build().unwrap();

        assert_eq!(config.api_base.as_str(), "https://api.mail.tm/");
        assert_eq!(config.polling.interval, Duration::from_secs(2));
        assert_eq!(config.polling.page_size, 10);
        assert_eq!(config.polling.fetch_concurrency, 1);
        assert_eq!(config.provisioning.retry_delay, Duration::from_millis(1500));
        assert!(config.provisioning.max_attempts.is_none());
        assert!(config.proxy.is_none());
        assert_eq!(config.state_path, SessionConfig::default_state_path());
        assert!(config.user_agent.starts_with("tempmail-sync/"));
    }

    #[test]
    fn test_builder_full() {
        let config = SessionConfig::builder()
            .api_base("http://localhost:8080/v1")
            .proxy(Socks5Proxy::new("proxy.local", 1080))
            .connect_timeout(Duration::from_secs(3))
            .poll_interval(Duration::from_secs(5))
            .page_size(25)
            .fetch_concurrency(4)
            .retry_delay(Duration::from_secs(2))
            .max_attempts(3)
            .state_path("/tmp/state.json")
            .event_capacity(8)
            .build()
            .unwrap();

        assert_eq!(config.api_base.as_str(), "http://localhost:8080/v1/");
        assert!(config.proxy.is_some());
        assert_eq!(config.timeouts.connect, Duration::from_secs(3));
        assert_eq!(config.timeouts.request, Duration::from_secs(30));
        assert_eq!(config.polling.page_size, 25);
        assert_eq!(config.polling.fetch_concurrency, 4);
        assert_eq!(config.provisioning.max_attempts, Some(3));
        assert_eq!(config.state_path, Some(PathBuf::from("/tmp/state.json")));
        assert_eq!(config.event_capacity, 8);
    }

    #[test]
    fn test_state_path_last_setting_wins() {
        let config = SessionConfig::builder().in_memory().build().unwrap();
        assert!(config.state_path.is_none());

        let config = SessionConfig::builder()
            .in_memory()
            .state_path("/tmp/a.json")
            .build()
            .unwrap();
        assert_eq!(config.state_path, Some(PathBuf::from("/tmp/a.json")));

        let config = SessionConfig::builder()
            .state_path("/tmp/a.json")
            .in_memory()
            .build()
            .unwrap();
        assert!(config.state_path.is_none());
    }

    #[test]
    fn test_default_config_persists() {
        assert_eq!(
            SessionConfig::default().state_path,
            SessionConfig::default_state_path()
        );
        if let Some(path) = SessionConfig::default_state_path() {
            assert!(path.ends_with("tempmail-sync/state.json"));
        }
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let config = SessionConfig::builder()
            .api_base("http://localhost:8080/v1")
            .build()
            .unwrap();

        assert_eq!(
            config.endpoint("messages/abc").unwrap().as_str(),
            "http://localhost:8080/v1/messages/abc"
        );

        let config = SessionConfig::default();
        assert_eq!(
            config.endpoint("domains").unwrap().as_str(),
            "https://api.mail.tm/domains"
        );
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        assert!(SessionConfig::builder().page_size(0).build().is_err());
        assert!(SessionConfig::builder().fetch_concurrency(0).build().is_err());
        assert!(SessionConfig::builder()
            .poll_interval(Duration::ZERO)
            .build()
            .is_err());
        assert!(SessionConfig::builder().max_attempts(0).build().is_err());
        assert!(SessionConfig::builder().event_capacity(0).build().is_err());
    }

    #[test]
    fn test_builder_rejects_non_http_base() {
        let result = SessionConfig::builder().api_base("ftp://example.com").build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));

        let result = SessionConfig::builder().api_base("not a url").build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }
}
