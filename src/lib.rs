//! # tempmail-sync
//!
//! Async disposable-mailbox client: provisions a temporary address on a mail.tm-compatible
//! API, keeps its inbox current by polling, and extracts OTP codes and confirmation links
//! from every message.
//!
//! This crate provides a high-level, async API for:
//! - Provisioning a mailbox (with optional SOCKS5 proxy support) and persisting it between runs
//! - Receiving new messages as typed events, enriched with extracted tokens
//! - Extracting OTP codes and confirmation links from arbitrary text and HTML
//!
//! ## Quick Start
//!
//! ```no_run
//! use tempmail_sync::{MailSession, SessionConfig, SessionEvent};
//!
//! # async fn example() -> tempmail_sync::Result<()> {
//! // The mailbox is persisted under the platform data directory, so the same
//! // address survives restarts. Use `.in_memory()` to opt out.
//! let config = SessionConfig::builder().build()?;
//!
//! let session = MailSession::from_config(config)?;
//! let mut events = session.subscribe();
//!
//! // Restore or provision a mailbox, load the inbox and start polling
//! session.start().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let SessionEvent::NewMessage(message) = event {
//!         if let Some(code) = message.otp() {
//!             println!("Got OTP: {code}");
//!             break;
//!         }
//!     }
//! }
//!
//! session.stop_polling();
//! # Ok(())
//! # }
//! ```
//!
//! ## Using a SOCKS5 Proxy
//!
//! ```no_run
//! use tempmail_sync::{MailSession, SessionConfig, Socks5Proxy};
//!
//! # async fn example() -> tempmail_sync::Result<()> {
//! let config = SessionConfig::builder()
//!     .proxy(Socks5Proxy::with_auth("proxy.example.com", 1080, "user", "pass"))
//!     .build()?;
//!
//! let session = MailSession::from_config(config)?;
//! session.start().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Token Extraction
//!
//! Extraction works on any text, independent of a session:
//!
//! ```
//! use tempmail_sync::matcher::{extract_otp, Matcher, RegexMatcher};
//!
//! assert_eq!(extract_otp("Your OTP: 4821").as_deref(), Some("4821"));
//!
//! // Custom patterns return their first capture group
//! let matcher = RegexMatcher::new(r"token=([a-f0-9]{8})").unwrap();
//! assert_eq!(
//!     matcher.find_match("?token=deadbeef").as_deref(),
//!     Some("deadbeef")
//! );
//! ```
//!
//! ## Error Handling
//!
//! All errors implement `std::error::Error` and provide context. Use [`Error::is_retryable`]
//! to determine if an operation can be retried:
//!
//! ```
//! use tempmail_sync::Error;
//!
//! fn handle_error(error: &Error) {
//!     if error.is_retryable() {
//!         println!("Transient error, can retry: {}", error);
//!     } else {
//!         println!("Permanent error: {}", error);
//!     }
//! }
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation. All provider calls and session
//! operations emit spans with structured fields.
//!
//! ### Span Naming Convention
//!
//! - `MailSession::start` - Restore or provision, then load and poll
//! - `MailSession::provision` - Provisioning with retries
//! - `MailSession::refresh` - Full inbox load
//! - `MailSession::poll_once` - One poll cycle
//! - `MailSession::reset` - Replace the mailbox
//! - `api::*` - Individual provider calls
//! - `connection::build_client` - HTTP client construction
//!
//! ### Standard Fields
//!
//! - `address` - Mailbox address
//! - `message_id` - Provider message id
//! - `proxy_enabled` - Whether proxy is used
//! - `category` - [`ErrorCategory`] of a contained failure
//!
//! Passwords and tokens never appear in spans or events.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod config;
pub mod error;
pub mod events;
pub mod matcher;
pub mod model;
pub mod poller;
pub mod provider;
pub mod proxy;
pub mod storage;
pub mod store;

// Internal modules
mod api;
mod connection;
mod parser;
mod session;

// Re-exports for ergonomic API
pub use api::HttpProvider;
pub use config::{
    PollingConfig, ProvisioningConfig, SessionConfig, SessionConfigBuilder, TimeoutConfig,
};
pub use error::{Error, ErrorCategory, Operation, Result};
pub use events::{InboxMessage, SessionEvent};
pub use matcher::ExtractedTokens;
pub use model::{Domain, Mailbox, MessageFull, MessageSummary, Sender, Theme};
pub use provider::MailProvider;
pub use proxy::{ProxyAuth, Socks5Proxy};
pub use session::MailSession;
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, StateStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_accessible() {
        // Ensure all public types are accessible
        let _ = SessionConfig::builder();
        let _ = Socks5Proxy::new("localhost", 1080);
        let _ = matcher::OtpMatcher::new();
        let _ = StateStore::in_memory();
        let _ = store::MessageStore::new();
    }
}
