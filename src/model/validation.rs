use super::HuntError;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_LOCATION_LEN: usize = 200;
pub const MAX_TIME_LIMIT_MINUTES: u32 = 24 * 60;

/// Trims a display name and checks it is non-empty and short enough.
pub fn name(field: &str, value: &str) -> Result<String, HuntError> {
    bounded(field, value, MAX_NAME_LEN)
}

pub fn location(field: &str, value: &str) -> Result<String, HuntError> {
    bounded(field, value, MAX_LOCATION_LEN)
}

pub fn time_limit(minutes: u32) -> Result<u32, HuntError> {
    if minutes == 0 || minutes > MAX_TIME_LIMIT_MINUTES {
        return Err(HuntError::invalid(format!(
            "time_limit_minutes must be between 1 and {}",
            MAX_TIME_LIMIT_MINUTES
        )));
    }
    Ok(minutes)
}

pub fn non_empty(field: &str, value: &str) -> Result<String, HuntError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(HuntError::invalid(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn bounded(field: &str, value: &str, max: usize) -> Result<String, HuntError> {
    let trimmed = non_empty(field, value)?;
    if trimmed.chars().count() > max {
        return Err(HuntError::invalid(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_names() {
        assert_eq!(name("team_name", "  Owls ").unwrap(), "Owls");
    }

    #[test]
    fn rejects_blank_and_long_names() {
        assert!(name("team_name", "   ").is_err());
        assert!(name("team_name", &"x".repeat(101)).is_err());
        assert!(name("team_name", &"x".repeat(100)).is_ok());
    }

    #[test]
    fn time_limit_bounds() {
        assert!(time_limit(0).is_err());
        assert_eq!(time_limit(60).unwrap(), 60);
        assert!(time_limit(24 * 60 + 1).is_err());
    }
}
