use std::sync::OnceLock;

use regex::Regex;

fn email_pattern() -> &'static Regex {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE.get_or_init(|| {
        // Standard address-shape check, not full RFC 5321 validation.
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap()
    })
}

/// Whether `value` has the shape of an email address.
pub fn is_valid_email(value: &str) -> bool {
    value.len() <= 254 && email_pattern().is_match(value)
}

/// Normalize an email for use as the contacts natural key: trimmed and
/// lowercased, so that resubmissions dedupe regardless of input casing.
pub fn normalize_email(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}
