use crate::error::{AppError, Result};

/// Minimum length of master key material, in bytes.
pub const MIN_MASTER_KEY_LEN: usize = 32;

/// Validates master key material.
///
/// This is a floor against obviously weak keys, not an entropy estimator.
///
/// # Arguments
///
/// * `key` - The key material to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the key is acceptable.
pub fn validate_master_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(AppError::InvalidKey("Master key cannot be empty".to_string()));
    }

    if key.len() < MIN_MASTER_KEY_LEN {
        return Err(AppError::InvalidKey(format!(
            "Master key must be at least {} bytes long",
            MIN_MASTER_KEY_LEN
        )));
    }

    if has_short_period(key.as_bytes()) {
        return Err(AppError::InvalidKey(
            "Master key must not be a repeated character or a 2-character pattern".to_string(),
        ));
    }

    Ok(())
}

/// True when the bytes repeat with a period of 1 or 2.
fn has_short_period(bytes: &[u8]) -> bool {
    [1usize, 2]
        .iter()
        .any(|&period| bytes.iter().skip(period).zip(bytes).all(|(a, b)| a == b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_random_looking_key() {
        assert!(validate_master_key("a1b2c3d4e5f678901234567890123456").is_ok());
    }

    #[test]
    fn rejects_empty_and_short_keys() {
        assert!(validate_master_key("").is_err());
        assert!(validate_master_key("0123456789abcdef").is_err());
    }

    #[test]
    fn rejects_repeated_character() {
        assert!(validate_master_key(&"a".repeat(64)).is_err());
    }

    #[test]
    fn rejects_two_character_pattern() {
        assert!(validate_master_key(&"ab".repeat(32)).is_err());
        assert!(validate_master_key(&format!("{}a", "ab".repeat(20))).is_err());
    }

    #[test]
    fn three_character_pattern_passes_the_floor() {
        assert!(validate_master_key(&"abc".repeat(12)).is_ok());
    }
}
