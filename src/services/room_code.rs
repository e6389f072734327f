//! Short human-typable room codes.

use std::fmt;

use rand::Rng;

use crate::error::ServiceError;

/// Alphabet for generated codes; `0`, `O`, `1`, `I` and `L` are left out.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
/// Length of generated codes.
pub const CODE_LENGTH: usize = 6;
/// Attempts made before giving up on finding a free code.
pub const MAX_CODE_ATTEMPTS: usize = 20;

const MIN_INPUT_LENGTH: usize = 4;
const MAX_INPUT_LENGTH: usize = 8;

/// Room code normalized to uppercase and checked against `^[A-Z0-9]{4,8}$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode(String);

impl RoomCode {
    /// Normalize and validate a code supplied by a client.
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        let code = raw.trim().to_ascii_uppercase();
        let valid_length = (MIN_INPUT_LENGTH..=MAX_INPUT_LENGTH).contains(&code.len());
        let valid_chars = code
            .bytes()
            .all(|byte| byte.is_ascii_uppercase() || byte.is_ascii_digit());

        if valid_length && valid_chars {
            Ok(Self(code))
        } else {
            Err(ServiceError::InvalidInput(format!(
                "room code must be {MIN_INPUT_LENGTH}-{MAX_INPUT_LENGTH} letters or digits"
            )))
        }
    }

    /// Draw a fresh random code from [`CODE_ALPHABET`].
    pub fn random(rng: &mut impl Rng) -> Self {
        let code = (0..CODE_LENGTH)
            .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}
