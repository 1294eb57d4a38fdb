//! Example: Using tracing for observability.
//!
//! This example demonstrates how to enable structured logging using
//! the `tracing` ecosystem. Every provider call and session operation in
//! tempmail-sync emits tracing spans and events.
//!
//! # Usage
//!
//! ```bash
//! # Set log level (trace, debug, info, warn, error)
//! export RUST_LOG=tempmail_sync=debug
//!
//! cargo run --example with_tracing
//! ```

use std::time::Duration;
use tempmail_sync::{MailSession, SessionConfig};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> tempmail_sync::Result<()> {
    // Use RUST_LOG to control log levels, e.g. RUST_LOG=tempmail_sync=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tempmail_sync=info")),
        )
        .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = SessionConfig::builder()
        .poll_interval(Duration::from_secs(3))
        .build()?;

    tracing::debug!("Configuration built successfully");

    // Emits provisioning spans for domains, account creation and token exchange
    let session = MailSession::from_config(config)?;
    session.start().await?;

    tracing::info!(
        address = %session.address().unwrap_or_default(),
        "Mailbox ready, polling for 30 seconds"
    );

    // Each poll cycle emits a MailSession::poll_once span
    tokio::time::sleep(Duration::from_secs(30)).await;
    session.stop_polling();

    let snapshot = session.snapshot().await;
    tracing::info!(messages = snapshot.len(), "Example completed successfully");

    Ok(())
}
