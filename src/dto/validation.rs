//! Validation helpers for DTOs.

use validator::ValidationError;

/// Characters allowed in a join code.
pub const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
/// Length of a lobby join code.
pub const JOIN_CODE_LEN: usize = 6;

/// Validates that a join code is exactly six characters from the code
/// alphabet (uppercase, no ambiguous glyphs).
pub fn validate_join_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != JOIN_CODE_LEN {
        let mut err = ValidationError::new("join_code_length");
        err.message =
            Some(format!("join code must be exactly {JOIN_CODE_LEN} characters").into());
        return Err(err);
    }

    if !code.bytes().all(|b| JOIN_CODE_ALPHABET.contains(&b)) {
        let mut err = ValidationError::new("join_code_format");
        err.message = Some("join code contains characters outside the code alphabet".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a player display name: trimmed, non-empty, at most 32 characters,
/// no control characters.
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("name_empty");
        err.message = Some("player name must not be empty".into());
        return Err(err);
    }
    if trimmed.chars().count() > 32 {
        let mut err = ValidationError::new("name_length");
        err.message = Some("player name must be at most 32 characters".into());
        return Err(err);
    }
    if trimmed.chars().any(char::is_control) {
        let mut err = ValidationError::new("name_format");
        err.message = Some("player name must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a region selection: at least one entry, each a non-empty
/// lowercase ASCII identifier.
pub fn validate_regions(regions: &[String]) -> Result<(), ValidationError> {
    if regions.is_empty() {
        let mut err = ValidationError::new("regions_empty");
        err.message = Some("at least one region must be selected".into());
        return Err(err);
    }

    for region in regions {
        if region.is_empty()
            || !region
                .chars()
                .all(|c| c.is_ascii_lowercase() || c == '_' || c == '-')
        {
            let mut err = ValidationError::new("region_format");
            err.message =
                Some(format!("`{region}` is not a valid region identifier").into());
            return Err(err);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_join_code_valid() {
        assert!(validate_join_code("ABCDEF").is_ok());
        assert!(validate_join_code("X7Y2Z9").is_ok());
    }

    #[test]
    fn test_validate_join_code_invalid() {
        assert!(validate_join_code("ABCDE").is_err()); // too short
        assert!(validate_join_code("ABCDEFG").is_err()); // too long
        assert!(validate_join_code("abcdef").is_err()); // lowercase
        assert!(validate_join_code("ABCDE0").is_err()); // ambiguous zero
        assert!(validate_join_code("ABC DE").is_err()); // space
    }

    #[test]
    fn test_validate_player_name() {
        assert!(validate_player_name("ada").is_ok());
        assert!(validate_player_name("  ada  ").is_ok());
        assert!(validate_player_name("").is_err());
        assert!(validate_player_name("   ").is_err());
        assert!(validate_player_name(&"x".repeat(33)).is_err());
        assert!(validate_player_name("bad\u{7}name").is_err());
    }

    #[test]
    fn test_validate_regions() {
        assert!(validate_regions(&["europe".into(), "south_america".into()]).is_ok());
        assert!(validate_regions(&[]).is_err());
        assert!(validate_regions(&["Europe".into()]).is_err());
        assert!(validate_regions(&["".into()]).is_err());
    }
}
