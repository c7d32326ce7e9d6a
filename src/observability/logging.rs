use regex::Regex;
use std::sync::OnceLock;

/// Longest query text written to logs
const MAX_LOGGED_QUERY: usize = 200;

fn email_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").ok())
        .as_ref()
}

fn phone_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").ok())
        .as_ref()
}

fn mask(pattern: Option<&Regex>, text: String, replacement: &str) -> String {
    match pattern {
        Some(re) => re.replace_all(&text, replacement).into_owned(),
        None => text,
    }
}

/// Mask emails and phone numbers in a search query and truncate it for logging
pub fn sanitize_query(query: &str) -> String {
    let masked = mask(email_pattern(), query.to_string(), "[EMAIL]");
    let masked = mask(phone_pattern(), masked, "[PHONE]");

    if masked.chars().count() > MAX_LOGGED_QUERY {
        let mut truncated: String = masked.chars().take(MAX_LOGGED_QUERY - 3).collect();
        truncated.push_str("...");
        truncated
    } else {
        masked
    }
}
