//! Output sanitizer: redacts secret-shaped substrings
//! before artifact text is stored in a report or echoed back into
//! diagnostics, so a leaked token never gets re-emitted into CI logs.

use std::sync::LazyLock;

use regex::Regex;

const REDACTED: &str = "***";

/// Patterns matching the hosting platform's token formats, generic
/// bearer/basic auth headers, and a catch-all for `key=value`-shaped
/// secrets in environment dumps. Kept as a fixed list rather than
/// user-configurable, since the compiler itself never needs to sanitize
/// anything the user didn't already choose to put in an artifact.
static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"gh[pousr]_[A-Za-z0-9]{20,}").unwrap(),
        Regex::new(r"github_pat_[A-Za-z0-9_]{20,}").unwrap(),
        Regex::new(r"(?i)authorization:\s*(bearer|basic)\s+\S+").unwrap(),
        Regex::new(r"(?i)\b(token|secret|password|api[_-]?key)\b\s*[:=]\s*\S+").unwrap(),
    ]
});

/// Replace every match of a known secret shape in `text` with `***`.
pub fn redact(text: &str) -> String {
    let mut out = text.to_string();
    for pattern in PATTERNS.iter() {
        out = pattern.replace_all(&out, REDACTED).into_owned();
    }
    out
}

/// Count secret-shaped substrings in `text` without modifying it, for the
/// Audit Report Builder's `redacted_count` field.
pub fn count_matches(text: &str) -> u64 {
    PATTERNS.iter().map(|p| p.find_iter(text).count() as u64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_github_pat() {
        let text = "using token ghp_abcdefghijklmnopqrstuvwxyz01 for auth";
        let redacted = redact(text);
        assert!(!redacted.contains("ghp_abcdefghijklmnopqrstuvwxyz01"));
        assert!(redacted.contains(REDACTED));
    }

    #[test]
    fn redacts_authorization_header() {
        let text = "Authorization: Bearer abcdef123456";
        let redacted = redact(text);
        assert!(!redacted.contains("abcdef123456"));
    }

    #[test]
    fn leaves_ordinary_text_untouched() {
        let text = "the agent opened issue #42";
        assert_eq!(redact(text), text);
    }

    #[test]
    fn redacts_generic_key_value_secret() {
        let text = "api_key=sk_live_1234567890";
        let redacted = redact(text);
        assert!(!redacted.contains("sk_live_1234567890"));
    }

    #[test]
    fn count_matches_tallies_without_modifying_input() {
        let text = "found ghp_abcdefghijklmnopqrstuvwxyz01 then Authorization: Bearer xyz123";
        assert_eq!(count_matches(text), 2);
        assert!(text.contains("ghp_abcdefghijklmnopqrstuvwxyz01"));
    }
}
