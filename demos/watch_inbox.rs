//! Example: Watch a disposable inbox and print every arriving message.
//!
//! The mailbox is persisted to the platform data directory, so running this
//! example again keeps the same address.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example watch_inbox
//! ```

use tempmail_sync::{MailSession, SessionConfig, SessionEvent};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> tempmail_sync::Result<()> {
    let config = SessionConfig::builder().build()?;
    let session = MailSession::from_config(config)?;
    let mut events = session.subscribe();

    session.start().await?;
    println!(
        "Watching {} (Ctrl+C to stop)\n",
        session.address().unwrap_or_default()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SessionEvent::InboxLoaded { messages }) => {
                    println!("{} message(s) already in the inbox", messages.len());
                    for message in &messages {
                        println!("  {} | {}", message.from(), message.subject());
                    }
                }
                Ok(SessionEvent::NewMessage(message)) => {
                    println!("{}", message.notification());
                    println!("  Subject: {}", message.subject());
                    if let Some(code) = message.otp() {
                        println!("  OTP:     {code}");
                    }
                    if let Some(link) = message.confirmation_link() {
                        println!("  Link:    {link}");
                    }
                }
                Ok(SessionEvent::MailboxReady { address }) => println!("Mailbox ready: {address}"),
                Ok(SessionEvent::ProvisioningFailed { reason, retry_in }) => {
                    println!("Provisioning failed ({reason}), retrying in {retry_in:?}");
                }
                Ok(SessionEvent::InboxLoadFailed { reason }) => println!("Inbox load failed: {reason}"),
                Err(RecvError::Lagged(skipped)) => println!("Missed {skipped} event(s)"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.stop_polling();
    Ok(())
}
