//! Example: Provisioning a mailbox through a SOCKS5 proxy.
//!
//! All provider requests, DNS resolution included, go through the proxy.
//!
//! # Usage
//!
//! ```bash
//! export PROXY_HOST="proxy.example.com"
//! export PROXY_PORT="1080"
//! # Optional
//! export PROXY_USER="user"
//! export PROXY_PASS="pass"
//!
//! cargo run --example with_proxy
//! ```

use std::env;
use std::time::Duration;
use tempmail_sync::{MailSession, SessionConfig, SessionEvent, Socks5Proxy};

#[tokio::main]
async fn main() -> tempmail_sync::Result<()> {
    let host = env::var("PROXY_HOST").expect("PROXY_HOST environment variable required");
    let port: u16 = env::var("PROXY_PORT")
        .expect("PROXY_PORT environment variable required")
        .parse()
        .expect("PROXY_PORT must be a port number");

    let proxy = match (env::var("PROXY_USER"), env::var("PROXY_PASS")) {
        (Ok(user), Ok(pass)) => Socks5Proxy::with_auth(host, port, user, pass),
        _ => Socks5Proxy::new(host, port),
    };

    println!("Using proxy {proxy}");

    let config = SessionConfig::builder()
        .proxy(proxy)
        .connect_timeout(Duration::from_secs(15))
        .max_attempts(3)
        .build()?;

    let session = MailSession::from_config(config)?;
    let mut events = session.subscribe();
    session.start().await?;

    println!("Mailbox: {}", session.address().unwrap_or_default());
    println!("Waiting up to 2 minutes for a message...");

    let wait = async {
        while let Ok(event) = events.recv().await {
            if let SessionEvent::NewMessage(message) = event {
                return Some(message);
            }
        }
        None
    };

    match tokio::time::timeout(Duration::from_secs(120), wait).await {
        Ok(Some(message)) => println!("{}: {}", message.notification(), message.subject()),
        _ => println!("No message arrived"),
    }

    session.stop_polling();
    Ok(())
}
