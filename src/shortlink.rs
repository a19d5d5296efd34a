//! Short recipe links.
//!
//! A token is the URL-safe base64 encoding of the recipe id's decimal string
//! with the `=` padding stripped, so `12` becomes `MTI`. No lookup table is
//! involved; whether the id names an existing recipe is the caller's concern.

use base64::{engine::general_purpose::URL_SAFE, Engine};

use crate::error::{Result, ServerError};

pub fn encode(recipe_id: u64) -> String {
    URL_SAFE
        .encode(recipe_id.to_string())
        .trim_end_matches('=')
        .to_string()
}

pub fn decode(token: &str) -> Result<u64> {
    let mut padded = token.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }

    let bytes = URL_SAFE
        .decode(padded.as_bytes())
        .map_err(|_| ServerError::InvalidToken)?;
    let digits = std::str::from_utf8(&bytes).map_err(|_| ServerError::InvalidToken)?;

    // Only canonical decimal, otherwise several tokens would name one recipe
    let canonical = !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && (digits == "0" || !digits.starts_with('0'));
    if !canonical {
        return Err(ServerError::InvalidToken);
    }

    digits.parse().map_err(|_| ServerError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tokens() {
        assert_eq!(encode(1), "MQ");
        assert_eq!(encode(12), "MTI");
        assert_eq!(encode(123), "MTIz");
        assert_eq!(decode("MTI").unwrap(), 12);
    }

    #[test]
    fn test_round_trip() {
        for id in [0, 1, 9, 10, 99, 100, 4_096, 65_535, 1_000_000_007, u64::MAX] {
            let token = encode(id);
            assert!(!token.contains('='));
            assert_eq!(decode(&token).unwrap(), id, "token {}", token);
        }
    }

    #[test]
    fn test_tokens_are_url_safe() {
        for id in 0..2_000u64 {
            let token = encode(id);
            assert!(token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
        }
    }

    #[test]
    fn test_invalid_tokens() {
        // Not base64
        assert!(matches!(decode("!!!"), Err(ServerError::InvalidToken)));
        assert!(matches!(decode("M"), Err(ServerError::InvalidToken)));
        // Empty payload
        assert!(matches!(decode(""), Err(ServerError::InvalidToken)));
        // "abc" is base64 but not a number
        assert!(matches!(decode(&URL_SAFE.encode("abc")), Err(ServerError::InvalidToken)));
        // "-1" and "05" are not canonical non-negative decimals
        assert!(matches!(decode("LTE"), Err(ServerError::InvalidToken)));
        assert!(matches!(decode("MDU"), Err(ServerError::InvalidToken)));
        // Overflows u64
        let huge = URL_SAFE.encode("99999999999999999999999");
        assert!(matches!(decode(&huge), Err(ServerError::InvalidToken)));
    }
}
