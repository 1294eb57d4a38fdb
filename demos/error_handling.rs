//! Example: Proper error handling with retries.
//!
//! This example demonstrates how to classify errors by category and
//! retryability, both for provisioning and for manual inbox refreshes.
//!
//! # Usage
//!
//! ```bash
//! # Point at an unreachable API to see the failure paths
//! export TEMPMAIL_API_BASE="http://127.0.0.1:9"
//! cargo run --example error_handling
//! ```

use std::env;
use std::time::Duration;
use tempmail_sync::{Error, ErrorCategory, MailSession, SessionConfig};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Refresh with automatic retry for transient failures
async fn refresh_with_retry(session: &MailSession) -> Result<usize, Error> {
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1;

    loop {
        println!("Refresh attempt {attempt}/{MAX_RETRIES}...");

        match session.refresh().await {
            Ok(messages) => return Ok(messages.len()),
            Err(e) => {
                describe(&e);

                if !e.is_retryable() || attempt == MAX_RETRIES {
                    return Err(e);
                }

                println!("  Retrying in {backoff:?}...");
                tokio::time::sleep(backoff).await;
                backoff *= 2; // Exponential backoff
                attempt += 1;
            }
        }
    }
}

fn describe(e: &Error) {
    println!("  Error: {e}");
    println!("  Category: {}", e.category());
    println!("  Retryable: {}", e.is_retryable());
    if let Some(operation) = e.operation() {
        println!("  Operation: {operation}");
    }

    match e.category() {
        ErrorCategory::Network | ErrorCategory::Timeout => {
            println!("  -> Check connectivity or the proxy");
        }
        ErrorCategory::Auth => println!("  -> The mailbox token was rejected"),
        ErrorCategory::Protocol | ErrorCategory::Parse => {
            println!("  -> The provider answered unexpectedly");
        }
        ErrorCategory::Configuration => println!("  -> Fix the configuration"),
        ErrorCategory::Storage => println!("  -> Check the state file"),
        ErrorCategory::NotFound => println!("  -> Start the session first"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let mut builder = SessionConfig::builder()
        .in_memory()
        .retry_delay(Duration::from_millis(500))
        .max_attempts(MAX_RETRIES)
        .request_timeout(Duration::from_secs(10));

    if let Ok(api_base) = env::var("TEMPMAIL_API_BASE") {
        builder = builder.api_base(api_base);
    }

    let session = MailSession::from_config(builder.build()?)?;

    // Refreshing before a mailbox exists is a NotFound error
    if let Err(e) = session.refresh().await {
        describe(&e);
    }

    match session.start().await {
        Ok(()) => {
            session.stop_polling();
            println!("Mailbox: {}", session.address().unwrap_or_default());
        }
        Err(Error::ProvisioningExhausted { attempts, source }) => {
            println!("Gave up after {attempts} attempts");
            describe(&source);
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    let count = refresh_with_retry(&session).await?;
    println!("Inbox holds {count} message(s)");

    Ok(())
}
