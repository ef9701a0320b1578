//! The `<origin>#<body>` message convention.
//!
//! Clients optionally prefix outgoing text with their name and a `#`.
//! Consumers split on the first `#`; text without one comes from an
//! unknown origin.

use crate::constants::{ORIGIN_SEPARATOR, UNKNOWN_ORIGIN};

/// Prefix `body` with `<origin>#`.
pub fn compose(origin: &str, body: &str) -> String {
    format!("{origin}{ORIGIN_SEPARATOR}{body}")
}

/// A wire message split into sender and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    /// Sender name, or `"Unknown"` when the message had no prefix.
    pub origin: String,
    /// Message text after the first `#`.
    pub body: String,
}

impl ParsedMessage {
    /// Split `text` on its first `#`.
    pub fn parse(text: &str) -> Self {
        match text.split_once(ORIGIN_SEPARATOR) {
            Some((origin, body)) => Self {
                origin: origin.to_string(),
                body: body.to_string(),
            },
            None => Self {
                origin: UNKNOWN_ORIGIN.to_string(),
                body: text.to_string(),
            },
        }
    }

    /// Whether the message carried an origin prefix.
    pub fn has_known_origin(&self) -> bool {
        self.origin != UNKNOWN_ORIGIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_origin() {
        let msg = ParsedMessage::parse("Alice#Hello");
        assert_eq!(msg.origin, "Alice");
        assert_eq!(msg.body, "Hello");
        assert!(msg.has_known_origin());
    }

    #[test]
    fn test_parse_without_origin() {
        let msg = ParsedMessage::parse("Hello there");
        assert_eq!(msg.origin, "Unknown");
        assert_eq!(msg.body, "Hello there");
        assert!(!msg.has_known_origin());
    }

    #[test]
    fn test_parse_splits_on_first_separator_only() {
        let msg = ParsedMessage::parse("Alice#issue #42#fixed");
        assert_eq!(msg.origin, "Alice");
        assert_eq!(msg.body, "issue #42#fixed");
    }

    #[test]
    fn test_parse_empty_origin() {
        let msg = ParsedMessage::parse("#anonymous");
        assert_eq!(msg.origin, "");
        assert_eq!(msg.body, "anonymous");
    }

    #[test]
    fn test_compose_then_parse() {
        let wire = compose("Bob", "¿qué tal?");
        assert_eq!(wire, "Bob#¿qué tal?");
        assert_eq!(
            ParsedMessage::parse(&wire),
            ParsedMessage {
                origin: "Bob".to_string(),
                body: "¿qué tal?".to_string(),
            }
        );
    }
}
