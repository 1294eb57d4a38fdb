//! Typed events emitted by a [`MailSession`](crate::MailSession).
//!
//! Subscribers receive events over a `tokio::sync::broadcast` channel. A subscriber
//! that falls behind loses the oldest events (`RecvError::Lagged`); notification is
//! best-effort and never exactly-once.

use crate::matcher::ExtractedTokens;
use crate::model::MessageFull;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::trace;

/// A message enriched with its extracted tokens, ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct InboxMessage {
    /// The fetched message.
    pub message: MessageFull,
    /// OTP code and confirmation link found in it.
    pub tokens: ExtractedTokens,
}

impl InboxMessage {
    /// Runs extraction over `message`.
    #[must_use]
    pub fn new(message: MessageFull) -> Self {
        let tokens = ExtractedTokens::from_message(&message);
        Self { message, tokens }
    }

    /// Message id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.message.id()
    }

    /// Sender address, or `"unknown"`.
    #[must_use]
    pub fn from(&self) -> &str {
        self.message.summary.sender()
    }

    /// Subject, or `"(no subject)"`.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.message.summary.display_subject()
    }

    /// When the provider received the message.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.message.summary.created_at
    }

    /// Extracted OTP code, if any.
    #[must_use]
    pub fn otp(&self) -> Option<&str> {
        self.tokens.otp.as_deref()
    }

    /// Extracted confirmation link, if any.
    #[must_use]
    pub fn confirmation_link(&self) -> Option<&str> {
        self.tokens.confirmation_link.as_deref()
    }

    /// Short text suitable for a desktop notification.
    #[must_use]
    pub fn notification(&self) -> String {
        format!("New email from {}", self.from())
    }
}

/// Something a UI layer may want to react to.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A mailbox is active (restored or newly provisioned).
    MailboxReady {
        /// The mailbox address.
        address: String,
    },
    /// Creating a mailbox failed; another attempt follows after `retry_in`.
    ProvisioningFailed {
        /// Human-readable failure reason.
        reason: String,
        /// Delay before the next attempt.
        retry_in: Duration,
    },
    /// A full inbox load finished. Messages are newest first.
    InboxLoaded {
        /// Every message that could be fetched.
        messages: Vec<InboxMessage>,
    },
    /// A full inbox load failed before any message was fetched.
    InboxLoadFailed {
        /// Human-readable failure reason.
        reason: String,
    },
    /// A message arrived. Within one poll cycle these come oldest first.
    NewMessage(InboxMessage),
}

/// Sending half of the event channel.
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Delivers `event` to current subscribers. Having none is not an error.
    pub(crate) fn emit(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            trace!("No event subscribers");
        }
    }
}
