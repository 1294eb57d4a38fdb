//! Extraction of actionable tokens (OTP codes, confirmation links) from message bodies.
//!
//! This module provides a [`Matcher`] trait and built-in implementations, plus the
//! [`extract_otp`] and [`extract_confirmation_link`] functions used to enrich every
//! inbox message. Extraction is best-effort: malformed input yields `None`, never an error.
//!
//! # Example
//!
//! ```
//! use tempmail_sync::matcher::{extract_confirmation_link, extract_otp};
//!
//! assert_eq!(extract_otp("Your verification code: 482913").as_deref(), Some("482913"));
//!
//! let html = r#"<a href="https://example.com/verify?t=1">Confirm</a>"#;
//! assert_eq!(
//!     extract_confirmation_link(html, "").as_deref(),
//!     Some("https://example.com/verify?t=1")
//! );
//! ```

use crate::model::MessageFull;
use crate::parser;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Keyword-anchored OTP: a vocabulary word, optional separators, then 4-8 digits.
///
/// Word boundaries are ASCII-only, so an accented letter next to a code does not hide it.
static KEYWORD_OTP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?-u:\b)(?:code|otp|pin|verification|verify)[\s:]*#?([0-9]{4,8})(?-u:\b)")
        .expect("valid regex")
});

/// Fallback OTP: any standalone 4-8 digit run.
static BARE_OTP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u:\b)([0-9]{4,8})(?-u:\b)").expect("valid regex"));

/// Raw URL inside free text or markup.
static RAW_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)https?://[^\s<>"')\]]+"#).expect("valid regex"));

/// Words that mark a link as account confirmation rather than e.g. unsubscribe or social.
pub const CONFIRMATION_KEYWORDS: &[&str] = &[
    "verify", "confirm", "activate", "validate", "register", "signup", "email", "token",
    "account",
];

/// Trait for matching and extracting content from message text.
///
/// Implement this trait to define custom matching logic.
///
/// # Example
///
/// ```
/// use tempmail_sync::matcher::Matcher;
/// use std::borrow::Cow;
///
/// struct InviteCode;
///
/// impl Matcher for InviteCode {
///     fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
///         text.split_whitespace()
///             .find(|word| word.starts_with("INV-"))
///             .map(Cow::Borrowed)
///     }
///
///     fn description(&self) -> &str {
///         "invite code"
///     }
/// }
///
/// assert_eq!(InviteCode.find_match("use INV-42 today").as_deref(), Some("INV-42"));
/// ```
pub trait Matcher: Send + Sync {
    /// Attempts to find and extract matching content from the text.
    ///
    /// Uses `Cow<str>` to avoid allocations when the match can be borrowed
    /// directly from the input text.
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>>;

    /// Returns a human-readable description of what this matcher looks for.
    fn description(&self) -> &str;
}

/// Regex-based matcher that extracts the first capture group.
///
/// # Example
///
/// ```
/// use tempmail_sync::matcher::{RegexMatcher, Matcher};
///
/// let matcher = RegexMatcher::new(r"token=([a-f0-9]+)").unwrap();
/// assert_eq!(matcher.find_match("?token=abc123&x=1").as_deref(), Some("abc123"));
/// ```
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Regex,
    description: String,
}

impl RegexMatcher {
    /// Creates a new regex matcher.
    ///
    /// The regex should contain at least one capture group. The first capture group
    /// is extracted as the match result.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Self::with_description(pattern, format!("regex pattern: {pattern}"))
    }

    /// Creates a new regex matcher with a custom description.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn with_description(
        pattern: &str,
        description: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            description: description.into(),
        })
    }

    fn from_regex(regex: &Regex, description: &str) -> Self {
        Self {
            regex: regex.clone(),
            description: description.into(),
        }
    }
}

impl Matcher for RegexMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        self.regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| Cow::Borrowed(m.as_str()))
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Matcher for OTP (one-time passcode) codes.
///
/// The default matcher tries a keyword-anchored pattern first (`code`, `otp`, `pin`,
/// `verification`, `verify` followed by 4-8 digits) and falls back to the first
/// standalone 4-8 digit run. The fallback can pick up dates or amounts.
///
/// # Example
///
/// ```
/// use tempmail_sync::matcher::{OtpMatcher, Matcher};
///
/// let otp = OtpMatcher::new();
/// assert_eq!(otp.find_match("Order 2024: your code 8812").as_deref(), Some("8812"));
/// assert_eq!(otp.find_match("Ref 55120").as_deref(), Some("55120"));
/// assert_eq!(otp.find_match("no digits here"), None);
/// ```
#[derive(Debug, Clone)]
pub struct OtpMatcher {
    stages: Vec<RegexMatcher>,
    description: String,
}

impl Default for OtpMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl OtpMatcher {
    /// Creates the two-stage keyword-then-fallback OTP matcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: vec![
                RegexMatcher::from_regex(&KEYWORD_OTP, "keyword-anchored OTP"),
                RegexMatcher::from_regex(&BARE_OTP, "standalone digit run"),
            ],
            description: "4-8 digit OTP code".into(),
        }
    }

    /// Creates a matcher that only accepts keyword-anchored codes.
    #[must_use]
    pub fn keyword_only() -> Self {
        Self {
            stages: vec![RegexMatcher::from_regex(&KEYWORD_OTP, "keyword-anchored OTP")],
            description: "keyword-anchored OTP code".into(),
        }
    }

    /// Creates a matcher for OTP codes with a custom regex.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn custom(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            stages: vec![RegexMatcher::with_description(pattern, "custom OTP pattern")?],
            description: "custom OTP pattern".into(),
        })
    }
}

impl Matcher for OtpMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        self.stages.iter().find_map(|stage| stage.find_match(text))
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Matcher for account-confirmation links.
///
/// Collects anchor `href`s from the HTML first, then raw `http(s)://` URLs from the
/// whole input, and returns the first one containing a confirmation keyword.
///
/// # Example
///
/// ```
/// use tempmail_sync::matcher::{ConfirmationLinkMatcher, Matcher};
///
/// let matcher = ConfirmationLinkMatcher::new();
/// let html = r#"<a href="https://x.test/unsubscribe">Stop</a> https://x.test/activate/9"#;
/// assert_eq!(matcher.find_match(html).as_deref(), Some("https://x.test/activate/9"));
/// ```
#[derive(Debug, Clone)]
pub struct ConfirmationLinkMatcher {
    keywords: Vec<String>,
}

impl Default for ConfirmationLinkMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmationLinkMatcher {
    /// Creates a matcher using [`CONFIRMATION_KEYWORDS`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_keywords(CONFIRMATION_KEYWORDS.iter().copied())
    }

    /// Creates a matcher with a custom keyword list. Keywords are compared lowercase.
    #[must_use]
    pub fn with_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Finds the first confirmation link across an HTML body and a plain-text body.
    #[must_use]
    pub fn find_link(&self, html: &str, text: &str) -> Option<String> {
        candidate_links(html, text)
            .into_iter()
            .find(|url| self.is_confirmation(url))
    }

    fn is_confirmation(&self, url: &str) -> bool {
        let lower = url.to_lowercase();
        self.keywords.iter().any(|kw| lower.contains(kw.as_str()))
    }
}

impl Matcher for ConfirmationLinkMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        self.find_link(text, "").map(Cow::Owned)
    }

    fn description(&self) -> &str {
        "confirmation link"
    }
}

/// Returns every link in the message: anchor hrefs first, then raw URLs, deduplicated.
fn candidate_links(html: &str, text: &str) -> Vec<String> {
    let structured = parser::anchor_hrefs(html);

    let content = format!("{html} {text}");
    let raw = RAW_URL.find_iter(&content).map(|m| m.as_str().to_string());

    let mut seen = HashSet::new();
    structured
        .into_iter()
        .chain(raw)
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Extracts an OTP code from free text using [`OtpMatcher::new`].
///
/// Returns `None` if no 4-8 digit code is present.
#[must_use]
pub fn extract_otp(text: &str) -> Option<String> {
    OtpMatcher::new().find_match(text).map(Cow::into_owned)
}

/// Extracts the first confirmation link from an HTML body and/or a plain-text body.
///
/// Either body may be empty.
#[must_use]
pub fn extract_confirmation_link(html: &str, text: &str) -> Option<String> {
    ConfirmationLinkMatcher::new().find_link(html, text)
}

/// Tokens extracted from one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedTokens {
    /// OTP code found in the text body or subject.
    pub otp: Option<String>,
    /// Confirmation link found in the bodies.
    pub confirmation_link: Option<String>,
}

impl ExtractedTokens {
    /// Runs both extractors over a message.
    ///
    /// The OTP is looked up in the text body followed by the subject; the link in the
    /// HTML and text bodies.
    #[must_use]
    pub fn from_message(message: &MessageFull) -> Self {
        let otp_input = format!("{} {}", message.text, message.summary.subject);
        Self {
            otp: extract_otp(&otp_input),
            confirmation_link: extract_confirmation_link(&message.html, &message.text),
        }
    }

    /// Returns `true` if neither token was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.otp.is_none() && self.confirmation_link.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageSummary;
    use chrono::Utc;

    #[test]
    fn test_regex_matcher() {
        let matcher = RegexMatcher::new(r"code:\s*(\d+)").unwrap();
        assert_eq!(
            matcher.find_match("Your code: 12345").as_deref(),
            Some("12345")
        );
        assert_eq!(matcher.find_match("No code here"), None);
    }

    #[test]
    fn test_regex_matcher_returns_borrowed() {
        let matcher = RegexMatcher::new(r"code:\s*(\d+)").unwrap();
        let result = matcher.find_match("Your code: 12345");
        assert!(matches!(result, Some(Cow::Borrowed(_))));
    }

    #[test]
    fn test_otp_keyword_anchored() {
        assert_eq!(
            extract_otp("Your verification code: 123456").as_deref(),
            Some("123456")
        );
        assert_eq!(extract_otp("OTP#4821").as_deref(), Some("4821"));
        assert_eq!(extract_otp("PIN:  9090").as_deref(), Some("9090"));
        assert_eq!(extract_otp("VERIFY 55667788").as_deref(), Some("55667788"));
    }

    #[test]
    fn test_otp_keyword_preferred_over_earlier_number() {
        let text = "Order 20240501 shipped. Your code: 7788";
        assert_eq!(extract_otp(text).as_deref(), Some("7788"));
    }

    #[test]
    fn test_otp_fallback() {
        assert_eq!(extract_otp("Here it is: 12345").as_deref(), Some("12345"));
    }

    #[test]
    fn test_otp_next_to_non_ascii_letters() {
        assert_eq!(extract_otp("é1234").as_deref(), Some("1234"));
        assert_eq!(extract_otp("Ваш код1234 ok").as_deref(), Some("1234"));
        assert_eq!(extract_otp("code 5678ü").as_deref(), Some("5678"));
    }

    #[test]
    fn test_otp_none() {
        assert_eq!(extract_otp(""), None);
        assert_eq!(extract_otp("Welcome aboard!"), None);
        assert_eq!(extract_otp("call 123 or 1234567890"), None);
    }

    #[test]
    fn test_otp_keyword_digit_boundaries() {
        assert_eq!(extract_otp("code 123"), None);
        assert_eq!(extract_otp("code 1234").as_deref(), Some("1234"));
        assert_eq!(extract_otp("code 12345678").as_deref(), Some("12345678"));
        assert_eq!(extract_otp("code 123456789"), None);

        let keyword_only = OtpMatcher::keyword_only();
        assert_eq!(keyword_only.find_match("code 123"), None);
        assert_eq!(keyword_only.find_match("code 123456789"), None);
        assert_eq!(keyword_only.find_match("code 1234").as_deref(), Some("1234"));
    }

    #[test]
    fn test_otp_short_keyword_run_falls_through_to_later_number() {
        // The 3-digit run next to the keyword is not captured; the fallback finds 98765
        assert_eq!(
            extract_otp("code: 123, ticket 98765").as_deref(),
            Some("98765")
        );
        assert_eq!(
            OtpMatcher::keyword_only().find_match("code: 123, ticket 98765"),
            None
        );
    }

    #[test]
    fn test_otp_custom() {
        let matcher = OtpMatcher::custom(r"([A-Z]{3}-\d{3})").unwrap();
        assert_eq!(matcher.find_match("use ABC-123").as_deref(), Some("ABC-123"));
        assert_eq!(matcher.description(), "custom OTP pattern");
    }

    #[test]
    fn test_link_from_anchor() {
        let html = r#"<a href="https://x.com/verify?t=1">click</a>"#;
        assert_eq!(
            extract_confirmation_link(html, "").as_deref(),
            Some("https://x.com/verify?t=1")
        );
    }

    #[test]
    fn test_link_from_plain_text() {
        let text = "Open https://x.com/verify?t=1 to continue.";
        assert_eq!(
            extract_confirmation_link("", text).as_deref(),
            Some("https://x.com/verify?t=1")
        );
    }

    #[test]
    fn test_link_without_keyword() {
        let html = r#"<a href="https://x.com/news">News</a> https://social.test/follow"#;
        assert_eq!(extract_confirmation_link(html, "see https://x.com/about"), None);
    }

    #[test]
    fn test_link_structured_before_raw() {
        let html = r#"<p>https://x.com/confirm/raw</p><a href="https://x.com/confirm/anchor">go</a>"#;
        assert_eq!(
            extract_confirmation_link(html, "").as_deref(),
            Some("https://x.com/confirm/anchor")
        );
    }

    #[test]
    fn test_link_entity_decoded_href() {
        let html = r#"<a href="https://x.com/activate?a=1&amp;b=2">go</a>"#;
        assert_eq!(
            extract_confirmation_link(html, "").as_deref(),
            Some("https://x.com/activate?a=1&b=2")
        );
    }

    #[test]
    fn test_link_keyword_case_insensitive() {
        let text = "https://x.com/Account/CONFIRM";
        assert_eq!(
            extract_confirmation_link("", text).as_deref(),
            Some("https://x.com/Account/CONFIRM")
        );
    }

    #[test]
    fn test_link_raw_url_stops_at_delimiters() {
        let text = "(see https://x.com/verify/abc) or [https://x.com/token/1]";
        let links = candidate_links("", text);
        assert_eq!(links, vec!["https://x.com/verify/abc", "https://x.com/token/1"]);
    }

    #[test]
    fn test_candidate_links_deduplicated() {
        let html = r#"<a href="https://x.com/verify">a</a>"#;
        let links = candidate_links(html, "https://x.com/verify");
        assert_eq!(links, vec!["https://x.com/verify"]);
    }

    #[test]
    fn test_link_malformed_html() {
        let html = r#"<div><a href="https://x.com/register"<<<>>><a href=</div"#;
        assert_eq!(
            extract_confirmation_link(html, "").as_deref(),
            Some("https://x.com/register")
        );
    }

    #[test]
    fn test_custom_keywords() {
        let matcher = ConfirmationLinkMatcher::with_keywords(["Magic"]);
        let text = "https://x.com/verify https://x.com/magic-login";
        assert_eq!(
            matcher.find_link("", text).as_deref(),
            Some("https://x.com/magic-login")
        );
    }

    #[test]
    fn test_extracted_tokens_from_message() {
        let message = MessageFull {
            summary: MessageSummary {
                id: "1".into(),
                from: None,
                subject: "Your PIN 4411".into(),
                created_at: Utc::now(),
            },
            text: "Welcome! Confirm at https://svc.test/confirm?id=9".into(),
            html: String::new(),
        };

        let tokens = ExtractedTokens::from_message(&message);
        assert_eq!(tokens.otp.as_deref(), Some("4411"));
        assert_eq!(
            tokens.confirmation_link.as_deref(),
            Some("https://svc.test/confirm?id=9")
        );
        assert!(!tokens.is_empty());
    }
}
