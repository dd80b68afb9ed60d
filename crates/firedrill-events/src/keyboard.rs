//! Keyboard key identifiers used by key-poll triggers
//!
//! The host reports which keys are held on each tick; these types abstract
//! away from whatever input backend the host uses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Represents a key on the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KeyCode {
    /// A character key (a-z, 0-9, symbols, etc.)
    Char(char),
    /// Enter/Return key
    Enter,
    /// Tab key
    Tab,
    /// Space bar
    Space,
    /// Backspace key
    Backspace,
    /// Escape key
    Escape,
    /// Up arrow key
    Up,
    /// Down arrow key
    Down,
    /// Left arrow key
    Left,
    /// Right arrow key
    Right,
    /// Function keys F1-F12
    F(u8),
    /// No key. Key-poll packages bound to it never fire.
    Null,
}

impl KeyCode {
    /// Create a character key, normalised to lowercase
    pub fn char(c: char) -> Self {
        KeyCode::Char(c.to_ascii_lowercase())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, KeyCode::Null)
    }
}

/// Error returned when a key name cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseKeyError(pub String);

impl fmt::Display for ParseKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown key name '{}'", self.0)
    }
}

impl std::error::Error for ParseKeyError {}

impl FromStr for KeyCode {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();

        let key = match lower.as_str() {
            "" | "none" | "null" => KeyCode::Null,
            "enter" | "return" => KeyCode::Enter,
            "tab" => KeyCode::Tab,
            "space" => KeyCode::Space,
            "backspace" => KeyCode::Backspace,
            "escape" | "esc" => KeyCode::Escape,
            "up" => KeyCode::Up,
            "down" => KeyCode::Down,
            "left" => KeyCode::Left,
            "right" => KeyCode::Right,
            _ => {
                let mut chars = lower.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => KeyCode::char(c),
                    (Some('f'), Some(_)) => match lower[1..].parse::<u8>() {
                        Ok(n @ 1..=12) => KeyCode::F(n),
                        _ => return Err(ParseKeyError(trimmed.to_string())),
                    },
                    _ => return Err(ParseKeyError(trimmed.to_string())),
                }
            }
        };

        Ok(key)
    }
}

impl TryFrom<String> for KeyCode {
    type Error = ParseKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KeyCode> for String {
    fn from(key: KeyCode) -> Self {
        key.to_string()
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyCode::Char(c) => write!(f, "{}", c),
            KeyCode::Enter => write!(f, "enter"),
            KeyCode::Tab => write!(f, "tab"),
            KeyCode::Space => write!(f, "space"),
            KeyCode::Backspace => write!(f, "backspace"),
            KeyCode::Escape => write!(f, "escape"),
            KeyCode::Up => write!(f, "up"),
            KeyCode::Down => write!(f, "down"),
            KeyCode::Left => write!(f, "left"),
            KeyCode::Right => write!(f, "right"),
            KeyCode::F(n) => write!(f, "f{}", n),
            KeyCode::Null => write!(f, "none"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_keys() {
        assert_eq!("Enter".parse::<KeyCode>(), Ok(KeyCode::Enter));
        assert_eq!("esc".parse::<KeyCode>(), Ok(KeyCode::Escape));
        assert_eq!("F5".parse::<KeyCode>(), Ok(KeyCode::F(5)));
        assert_eq!("".parse::<KeyCode>(), Ok(KeyCode::Null));
    }

    #[test]
    fn test_parse_char_is_case_insensitive() {
        assert_eq!("A".parse::<KeyCode>(), Ok(KeyCode::Char('a')));
        assert_eq!("f".parse::<KeyCode>(), Ok(KeyCode::Char('f')));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!("f13".parse::<KeyCode>().is_err());
        assert!("shift".parse::<KeyCode>().is_err());
    }

    #[test]
    fn test_display_parses_back() {
        for key in [KeyCode::Char('x'), KeyCode::F(12), KeyCode::Space, KeyCode::Null] {
            assert_eq!(key.to_string().parse::<KeyCode>(), Ok(key));
        }
    }
}
