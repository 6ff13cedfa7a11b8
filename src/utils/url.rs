//! Message-URL parsing and username normalization utilities, ported from
//! `utils.py` / `tg/utils/__init__.py`.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlParseError {
    #[error("url does not start with t.me/: {0}")]
    Structural(String),

    #[error("could not parse message id from url: {0}")]
    InvalidMessageId(String),
}

fn at_sign_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@[A-Za-z0-9_]{5,32}").unwrap())
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https://t\.me/([A-Za-z0-9_]{5,32})").unwrap())
}

/// Lowercase, `@`-prefixed canonical form of a chat identifier.
pub fn ensure_at_single(s: &str) -> String {
    let lowered = s.to_lowercase();
    if lowered.starts_with('@') {
        lowered
    } else {
        format!("@{lowered}")
    }
}

pub fn ensure_ats<'a>(strs: impl IntoIterator<Item = &'a str>) -> HashSet<String> {
    strs.into_iter().map(ensure_at_single).collect()
}

/// Extracts `@mention` and `https://t.me/<name>` usernames from free text.
pub fn get_nicknames(text: &str) -> HashSet<String> {
    if text.is_empty() {
        return HashSet::new();
    }

    let at_signs = at_sign_re().find_iter(text).map(|m| m.as_str());
    let links = link_re().captures_iter(text).map(|c| c.get(1).unwrap().as_str());

    ensure_ats(at_signs).into_iter().chain(ensure_ats(links)).collect()
}

/// Parses `t.me/<user>/<id>`, `t.me/<user>/<thread>/<id>`, `t.me/c/<channel>/<id>`,
/// `t.me/c/<channel>/<thread>/<id>`, optionally prefixed with `https://`.
///
/// Returns `(chat_id, message_id)`.
pub fn parse_telegram_message_url(url: &str) -> Result<(String, i64), UrlParseError> {
    let trimmed = url.strip_prefix("https://").unwrap_or(url);
    let parts: Vec<&str> = trimmed.split('/').collect();

    if parts.first().copied() != Some("t.me") {
        return Err(UrlParseError::Structural(url.to_string()));
    }

    let chat_id = if parts.len() > 3 {
        if parts.get(1).copied() == Some("c") {
            parts.get(2).copied()
        } else {
            parts.get(1).copied()
        }
    } else {
        parts.get(1).copied()
    };

    let chat_id = match chat_id {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => return Err(UrlParseError::Structural(url.to_string())),
    };

    let last = parts
        .last()
        .copied()
        .ok_or_else(|| UrlParseError::InvalidMessageId(url.to_string()))?;

    if last.is_empty() {
        return Err(UrlParseError::InvalidMessageId(url.to_string()));
    }

    let message_id: i64 = last
        .parse()
        .map_err(|_| UrlParseError::InvalidMessageId(url.to_string()))?;

    if message_id <= 0 {
        return Err(UrlParseError::Structural(url.to_string()));
    }

    Ok((chat_id, message_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_username_and_id() {
        assert_eq!(
            parse_telegram_message_url("t.me/username/123").unwrap(),
            ("username".to_string(), 123)
        );
    }

    #[test]
    fn parses_channel_prefix() {
        assert_eq!(
            parse_telegram_message_url("t.me/c/channel/456").unwrap(),
            ("channel".to_string(), 456)
        );
    }

    #[test]
    fn parses_username_with_thread_id() {
        assert_eq!(
            parse_telegram_message_url("t.me/username/thread_id/789").unwrap(),
            ("username".to_string(), 789)
        );
    }

    #[test]
    fn parses_https_channel_with_thread_id() {
        assert_eq!(
            parse_telegram_message_url("https://t.me/c/channel/thread_id/131415").unwrap(),
            ("channel".to_string(), 131415)
        );
    }

    #[test]
    fn parses_https_username() {
        assert_eq!(
            parse_telegram_message_url("https://t.me/username/101112").unwrap(),
            ("username".to_string(), 101112)
        );
    }

    #[test]
    fn edge_case_zero_thread_id() {
        assert_eq!(
            parse_telegram_message_url("t.me/username/0/1").unwrap(),
            ("username".to_string(), 1)
        );
    }

    #[test]
    fn rejects_empty_string() {
        assert!(matches!(
            parse_telegram_message_url(""),
            Err(UrlParseError::Structural(_))
        ));
    }

    #[test]
    fn rejects_negative_message_id() {
        assert!(matches!(
            parse_telegram_message_url("t.me/username/-123"),
            Err(UrlParseError::Structural(_))
        ));
    }

    #[test]
    fn rejects_non_numeric_message_id() {
        assert!(matches!(
            parse_telegram_message_url("t.me/username/notanumber"),
            Err(UrlParseError::InvalidMessageId(_))
        ));
    }

    #[test]
    fn rejects_wrong_domain() {
        assert!(matches!(
            parse_telegram_message_url("notat.me/username/123"),
            Err(UrlParseError::Structural(_))
        ));
    }

    #[test]
    fn rejects_missing_message_id() {
        assert!(matches!(
            parse_telegram_message_url("t.me/username/"),
            Err(UrlParseError::InvalidMessageId(_))
        ));
    }

    #[test]
    fn rejects_empty_chat_id() {
        assert!(matches!(
            parse_telegram_message_url("t.me//123"),
            Err(UrlParseError::Structural(_))
        ));
    }

    #[test]
    fn rejects_https_with_no_message_id() {
        assert!(matches!(
            parse_telegram_message_url("https://t.me/username"),
            Err(UrlParseError::InvalidMessageId(_))
        ));
    }

    #[test]
    fn ensure_at_single_is_idempotent() {
        let once = ensure_at_single("SomeUser");
        let twice = ensure_at_single(&once);
        assert_eq!(once, twice);
        assert!(twice.starts_with('@'));
        assert_eq!(twice, twice.to_lowercase());
    }

    #[test]
    fn nicknames_from_mentions_and_links() {
        let text = "ping @alice_1 and see https://t.me/bob_channel for details";
        let names = get_nicknames(text);
        assert!(names.contains("@alice_1"));
        assert!(names.contains("@bob_channel"));
    }

    #[test]
    fn nicknames_from_empty_text_is_empty() {
        assert!(get_nicknames("").is_empty());
    }
}
