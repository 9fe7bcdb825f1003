//! Parsers that classify free-form text references.
//!
//! Patterns are declared with `lazy_regex!` so they are validated at compile
//! time and built on first use.

#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;

/// Characters people put around phone numbers: `+`, parentheses, whitespace, dashes.
static RE_PHONE_NOISE: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"[+()\s-]");

/// Prefix of a username reference: `@name`, `t.me/name`, `t.me/+invite`, `t.me/joinchat/invite`.
static RE_USERNAME_PREFIX: lazy_regex::Lazy<regex::Regex> = lazy_regex!(
    r"(?i)^(?:@|(?:https?://)?(?:www\.)?(?:telegram\.(?:me|dog)|t\.me)/(@|\+|joinchat/)?)"
);

/// Shape of a valid public username. Consecutive underscores are checked separately.
static RE_VALID_USERNAME: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"(?i)^(?:[a-z]\w{3,30}[a-z\d]|gif|vid|pic|bing|wiki|imdb|bold|vote|like|coub)$");

/// Outcome of parsing a username-like reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedUsername {
    /// A public username, lower-cased and without prefix.
    Username(String),
    /// The hash part of a private invite link. Never resolvable as a username.
    Invite(String),
}

/// Normalises a phone-number-looking string into digits.
///
/// # Examples
///
/// ```
/// use oxide_session::parse::parse_phone;
///
/// assert_eq!(parse_phone("+1 (555) 010-99").as_deref(), Some("155501099"));
/// assert_eq!(parse_phone("alice"), None);
/// ```
#[must_use]
pub fn parse_phone(text: &str) -> Option<String> {
    let digits = RE_PHONE_NOISE.replace_all(text, "");
    (!digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())).then(|| digits.into_owned())
}

/// Parses `@name`, `name`, `t.me/name` and invite-link forms.
///
/// Returns `None` when the text is not a plausible username or invite.
///
/// # Examples
///
/// ```
/// use oxide_session::parse::{parse_username, ParsedUsername};
///
/// assert_eq!(
///     parse_username("https://t.me/Rust_Lang/"),
///     Some(ParsedUsername::Username("rust_lang".into()))
/// );
/// assert_eq!(
///     parse_username("t.me/+AbCdEf"),
///     Some(ParsedUsername::Invite("AbCdEf".into()))
/// );
/// ```
#[must_use]
pub fn parse_username(text: &str) -> Option<ParsedUsername> {
    let text = text.trim();
    let rest = match RE_USERNAME_PREFIX.captures(text) {
        Some(caps) => {
            let whole = caps.get(0).map_or(0, |m| m.end());
            let rest = &text[whole..];
            if let Some(marker) = caps.get(1) {
                if marker.as_str() != "@" {
                    return Some(ParsedUsername::Invite(rest.to_string()));
                }
            }
            rest.trim_end_matches('/')
        }
        None => text,
    };

    if RE_VALID_USERNAME.is_match(rest) && !rest.contains("__") {
        Some(ParsedUsername::Username(rest.to_lowercase()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_strips_formatting() {
        assert_eq!(parse_phone("+44 20-7946 0018").as_deref(), Some("442079460018"));
        assert_eq!(parse_phone("42").as_deref(), Some("42"));
    }

    #[test]
    fn test_phone_rejects_text_and_empty() {
        assert_eq!(parse_phone(""), None);
        assert_eq!(parse_phone("+"), None);
        assert_eq!(parse_phone("12a4"), None);
    }

    #[test]
    fn test_username_plain_and_prefixed() {
        let expected = Some(ParsedUsername::Username("durov".into()));
        assert_eq!(parse_username("durov"), expected);
        assert_eq!(parse_username("@Durov"), expected);
        assert_eq!(parse_username("telegram.me/durov"), expected);
        assert_eq!(parse_username("https://www.t.me/@durov"), expected);
    }

    #[test]
    fn test_username_invite_forms() {
        assert_eq!(
            parse_username("https://t.me/joinchat/AAAAAEHbEkejzxUjAUCzYg"),
            Some(ParsedUsername::Invite("AAAAAEHbEkejzxUjAUCzYg".into()))
        );
        assert_eq!(
            parse_username("t.me/+x1y2z3"),
            Some(ParsedUsername::Invite("x1y2z3".into()))
        );
    }

    #[test]
    fn test_username_rejects_invalid_shapes() {
        assert_eq!(parse_username("ab"), None);
        assert_eq!(parse_username("1234567"), None);
        assert_eq!(parse_username("double__underscore"), None);
        assert_eq!(parse_username("John Smith"), None);
    }
}
