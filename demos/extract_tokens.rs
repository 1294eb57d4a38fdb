//! Example: Extracting OTP codes and confirmation links without a mailbox.
//!
//! The extraction functions and matchers are pure and work on any text or HTML.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example extract_tokens
//! ```

use std::borrow::Cow;
use tempmail_sync::matcher::{
    extract_confirmation_link, extract_otp, ConfirmationLinkMatcher, Matcher, OtpMatcher,
    RegexMatcher,
};

/// Extracts the value of a `Reference:` line.
struct ReferenceMatcher;

impl Matcher for ReferenceMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        text.lines()
            .find_map(|line| line.trim().strip_prefix("Reference:"))
            .map(|rest| Cow::Borrowed(rest.trim()))
    }

    fn description(&self) -> &str {
        "reference line"
    }
}

fn main() {
    let text = "Hi!\nYour verification code: 482913\nReference: AB-77\nOrder total 2024.";
    let html = r#"
        <p>Welcome aboard.</p>
        <a href="https://shop.example/unsubscribe">Unsubscribe</a>
        <a href="https://shop.example/account/confirm?token=abc&amp;lang=en">Confirm</a>
    "#;

    println!("OTP:               {:?}", extract_otp(text));
    println!("Confirmation link: {:?}", extract_confirmation_link(html, text));

    // The same algorithms as matchers, plus custom ones
    let matchers: Vec<Box<dyn Matcher>> = vec![
        Box::new(OtpMatcher::new()),
        Box::new(OtpMatcher::keyword_only()),
        Box::new(ConfirmationLinkMatcher::with_keywords(["unsubscribe"])),
        Box::new(RegexMatcher::new(r"total (\d+)").expect("valid regex")),
        Box::new(ReferenceMatcher),
    ];

    println!();
    for matcher in &matchers {
        let input = if matcher.description() == "confirmation link" {
            html
        } else {
            text
        };
        println!("{:<40} {:?}", matcher.description(), matcher.find_match(input));
    }
}
