//! Phone number type.
//!
//! Guest checkout identifies a customer by phone number, so the phone is the
//! one piece of customer identity validated at every boundary.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Phone`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum PhoneError {
    /// The input string is empty.
    #[error("phone cannot be empty")]
    Empty,
    /// The input has too few digits to be a phone number.
    #[error("phone must have at least {min} digits")]
    TooShort {
        /// Minimum required digit count.
        min: usize,
    },
    /// The input has too many digits.
    #[error("phone must have at most {max} digits")]
    TooLong {
        /// Maximum allowed digit count.
        max: usize,
    },
    /// The input contains a character that is not a digit or separator.
    #[error("phone may only contain digits, spaces, and ()+-. separators")]
    InvalidCharacter,
}

/// A customer phone number, stored in canonical digits-only form.
///
/// Separators (`(`, `)`, `+`, `-`, `.`, spaces) are accepted on input and
/// stripped, so `"(11) 98765-4321"` and `"11987654321"` compare equal. This
/// matters because order-detail authorization compares the caller's phone to
/// the one stored on the order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Phone(String);

impl Phone {
    /// Minimum digit count (short local numbers).
    pub const MIN_DIGITS: usize = 8;
    /// Maximum digit count (E.164 allows 15).
    pub const MAX_DIGITS: usize = 15;

    /// Parse a `Phone` from a string, normalizing away separators.
    ///
    /// # Errors
    ///
    /// Returns [`PhoneError`] if the input is empty, contains invalid
    /// characters, or has an out-of-range digit count.
    pub fn parse(s: &str) -> Result<Self, PhoneError> {
        if s.trim().is_empty() {
            return Err(PhoneError::Empty);
        }

        let mut digits = String::with_capacity(s.len());
        for c in s.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
            } else if !matches!(c, ' ' | '(' | ')' | '+' | '-' | '.') {
                return Err(PhoneError::InvalidCharacter);
            }
        }

        if digits.len() < Self::MIN_DIGITS {
            return Err(PhoneError::TooShort {
                min: Self::MIN_DIGITS,
            });
        }
        if digits.len() > Self::MAX_DIGITS {
            return Err(PhoneError::TooLong {
                max: Self::MAX_DIGITS,
            });
        }

        Ok(Self(digits))
    }

    /// Get the canonical digits-only form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Phone {
    type Err = PhoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_separators() {
        let a = Phone::parse("(11) 98765-4321").expect("valid");
        let b = Phone::parse("11987654321").expect("valid");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "11987654321");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(Phone::parse(""), Err(PhoneError::Empty)));
        assert!(matches!(
            Phone::parse("call me"),
            Err(PhoneError::InvalidCharacter)
        ));
        assert!(matches!(
            Phone::parse("123"),
            Err(PhoneError::TooShort { .. })
        ));
        assert!(matches!(
            Phone::parse("1234567890123456"),
            Err(PhoneError::TooLong { .. })
        ));
    }

    #[test]
    fn test_parse_accepts_country_code() {
        let p = Phone::parse("+55 11 98765-4321").expect("valid");
        assert_eq!(p.as_str(), "5511987654321");
    }
}
