//! Internal module for pulling links out of HTML message bodies.
//!
//! Provider HTML is untrusted and often malformed, so this is a tolerant scan for
//! anchor tags rather than a full DOM parse. Anything that cannot be understood is
//! skipped instead of failing the whole body.

use regex::Regex;
use std::sync::LazyLock;
use tracing::trace;
use url::Url;

/// An `<a>` tag's `href` attribute: double-quoted, single-quoted or bare.
static ANCHOR_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s(?:[^>]*?\s)?href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid regex")
});

/// Collects the resolved `href` of every anchor in an HTML fragment, in document order.
///
/// Only absolute `http`/`https` links are kept: a fragment has no base URL to resolve
/// relative ones against. Returned URLs are normalized by [`Url`].
pub(crate) fn anchor_hrefs(html: &str) -> Vec<String> {
    ANCHOR_HREF
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .filter_map(|raw| resolve_href(raw.as_str()))
        .collect()
}

/// Decodes and resolves one `href` value.
fn resolve_href(raw: &str) -> Option<String> {
    let decoded = decode_entities(raw.trim());

    match Url::parse(&decoded) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url.into()),
        Ok(url) => {
            trace!(scheme = url.scheme(), "Skipping non-web anchor");
            None
        }
        Err(e) => {
            trace!(error = %e, "Skipping unresolvable anchor");
            None
        }
    }
}

/// Decodes the character references that commonly appear inside attribute values.
fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        match tail.find(';').and_then(|end| {
            decode_reference(&tail[1..end]).map(|decoded| (decoded, end))
        }) {
            Some((decoded, end)) => {
                out.push(decoded);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "lt" => Some('<'),
        "gt" => Some('>'),
        _ => {
            let numeric = name.strip_prefix('#')?;
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
