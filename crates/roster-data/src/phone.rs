//! Phone number canonicalisation.
//!
//! The directory stores North American numbers as their ten national digits
//! (`4165551234`). Formatting characters and a leading `+1`/`1` country code
//! are accepted on input; anything else is rejected.
use thiserror::Error;

const SEPARATORS: [char; 5] = [' ', '-', '.', '(', ')'];
const NATIONAL_LEN: usize = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    #[error("phone number is empty")]
    Empty,
    #[error("unexpected character {0:?} in phone number")]
    InvalidCharacter(char),
    #[error("phone number has {0} digits, expected 10 (or 11 with a leading 1)")]
    InvalidLength(usize),
    #[error("area code {0} is not valid")]
    InvalidAreaCode(String),
    #[error("exchange code {0} is not valid")]
    InvalidExchange(String),
}

/// Parse `input` into the canonical ten-digit directory form.
///
/// ```
/// use roster_data::canonical_phone;
///
/// assert_eq!(canonical_phone("(416) 555-1234").unwrap(), "4165551234");
/// assert_eq!(canonical_phone("+1 416.555.1234").unwrap(), "4165551234");
/// assert!(canonical_phone("555-1234").is_err());
/// ```
pub fn canonical_phone(input: &str) -> Result<String, PhoneError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(PhoneError::Empty);
    }

    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let mut digits = String::with_capacity(body.len());
    for c in body.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !SEPARATORS.contains(&c) {
            return Err(PhoneError::InvalidCharacter(c));
        }
    }

    let national = match digits.len() {
        NATIONAL_LEN => digits,
        len if len == NATIONAL_LEN + 1 && digits.starts_with('1') => digits[1..].to_string(),
        len => return Err(PhoneError::InvalidLength(len)),
    };

    // NANP: neither the area code nor the exchange may start with 0 or 1.
    if matches!(national.as_bytes()[0], b'0' | b'1') {
        return Err(PhoneError::InvalidAreaCode(national[..3].to_string()));
    }
    if matches!(national.as_bytes()[3], b'0' | b'1') {
        return Err(PhoneError::InvalidExchange(national[3..6].to_string()));
    }

    Ok(national)
}

/// Every ASCII digit of `input`, in order. Used for substring matching where
/// the input is a fragment rather than a full number.
#[must_use]
pub fn strip_non_digits(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

#[must_use]
pub fn has_digit(input: &str) -> bool {
    input.chars().any(|c| c.is_ascii_digit())
}
