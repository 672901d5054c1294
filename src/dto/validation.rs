use validator::ValidationError;

/// Session codes are uppercase alphanumeric, exactly `length` characters
/// long. The expected length comes from the runtime configuration so the
/// check tracks whatever code length the generator is using.
pub fn validate_session_code(code: &str, length: usize) -> Result<(), ValidationError> {
    let well_formed = code.len() == length
        && code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::new("session_code"))
    }
}
