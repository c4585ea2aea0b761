use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(pub [u8; 4]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorParseError {
    #[error("color must start with '#': {0:?}")]
    MissingHash(String),
    #[error("color must have 3, 6 or 8 hex digits: {0:?}")]
    InvalidLength(String),
    #[error("color contains a non-hex digit: {0:?}")]
    InvalidDigit(String),
}

impl Color {
    pub const BLACK: Color = Color([0, 0, 0, 255]);
    pub const WHITE: Color = Color([255, 255, 255, 255]);
    pub const TRANSPARENT: Color = Color([0, 0, 0, 0]);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    pub fn rgba(self) -> [u8; 4] {
        self.0
    }

    /// Parses CSS hex notation: `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(raw: &str) -> Result<Self, ColorParseError> {
        let digits = raw
            .strip_prefix('#')
            .ok_or_else(|| ColorParseError::MissingHash(raw.to_string()))?;
        if !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(ColorParseError::InvalidDigit(raw.to_string()));
        }

        let channel = |index: usize, width: usize| -> u8 {
            let slice = &digits[index * width..index * width + width];
            let value = u8::from_str_radix(slice, 16).unwrap_or(0);
            if width == 1 {
                value * 17
            } else {
                value
            }
        };

        match digits.len() {
            3 => Ok(Self([channel(0, 1), channel(1, 1), channel(2, 1), 255])),
            6 => Ok(Self([channel(0, 2), channel(1, 2), channel(2, 2), 255])),
            8 => Ok(Self([
                channel(0, 2),
                channel(1, 2),
                channel(2, 2),
                channel(3, 2),
            ])),
            _ => Err(ColorParseError::InvalidLength(raw.to_string())),
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        if a == 255 {
            write!(f, "#{r:02x}{g:02x}{b:02x}")
        } else {
            write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
        }
    }
}

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hex_expands_each_digit() {
        assert_eq!(Color::from_hex("#000").expect("black"), Color::BLACK);
        assert_eq!(
            Color::from_hex("#f80").expect("orange"),
            Color([255, 136, 0, 255])
        );
    }

    #[test]
    fn long_hex_with_and_without_alpha() {
        assert_eq!(
            Color::from_hex("#1a2b3c").expect("rgb"),
            Color([0x1a, 0x2b, 0x3c, 255])
        );
        assert_eq!(
            Color::from_hex("#1a2b3c80").expect("rgba"),
            Color([0x1a, 0x2b, 0x3c, 0x80])
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            Color::from_hex("000"),
            Err(ColorParseError::MissingHash(_))
        ));
        assert!(matches!(
            Color::from_hex("#12345"),
            Err(ColorParseError::InvalidLength(_))
        ));
        assert!(matches!(
            Color::from_hex("#zzz"),
            Err(ColorParseError::InvalidDigit(_))
        ));
    }

    #[test]
    fn serializes_as_hex_string() {
        let json = serde_json::to_string(&Color::rgb(255, 0, 16)).expect("serialize");
        assert_eq!(json, "\"#ff0010\"");
        let parsed: Color = serde_json::from_str("\"#0f0\"").expect("deserialize");
        assert_eq!(parsed, Color::rgb(0, 255, 0));
        assert!(serde_json::from_str::<Color>("\"green\"").is_err());
    }
}
