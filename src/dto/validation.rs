//! Validation helpers for DTOs.

use validator::ValidationError;

const MAX_REGION_ID_LENGTH: usize = 64;

/// Validates that a region id is non-empty, at most 64 characters, and uses
/// only ASCII alphanumerics, `-` and `_`.
pub fn validate_region_id(region_id: &str) -> Result<(), ValidationError> {
    if region_id.is_empty() || region_id.len() > MAX_REGION_ID_LENGTH {
        let mut err = ValidationError::new("region_id_length");
        err.message = Some(
            format!(
                "Region id must be between 1 and {MAX_REGION_ID_LENGTH} characters (got {})",
                region_id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !region_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        let mut err = ValidationError::new("region_id_format");
        err.message =
            Some("Region id must contain only ASCII alphanumerics, `-` or `_`".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_region_id_valid() {
        assert!(validate_region_id("R1").is_ok());
        assert!(validate_region_id("world").is_ok());
        assert!(validate_region_id("north_east-42").is_ok());
    }

    #[test]
    fn test_validate_region_id_invalid_length() {
        assert!(validate_region_id("").is_err());
        assert!(validate_region_id(&"r".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_region_id_invalid_format() {
        assert!(validate_region_id("region#1").is_err());
        assert!(validate_region_id("region 1").is_err());
        assert!(validate_region_id("régiön").is_err());
    }
}
