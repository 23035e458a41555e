//! Job identity: scenario key validation and job id derivation.

use crate::error::CoreError;
use crate::types::{JobClass, JobId};

/// Maximum length of a user-supplied scenario key.
const MAX_SCENARIO_KEY_LEN: usize = 128;

/// Maximum number of scenario-key characters carried into a job id.
const MAX_ID_SLUG_LEN: usize = 48;

/// Validate a scenario key.
///
/// Rules:
/// - Must not be empty or whitespace only.
/// - Must not exceed `MAX_SCENARIO_KEY_LEN` characters.
/// - Must not contain control characters.
pub fn validate_scenario_key(key: &str) -> Result<(), CoreError> {
    if key.trim().is_empty() {
        return Err(CoreError::Validation(
            "Scenario key must not be empty".to_string(),
        ));
    }
    if key.chars().count() > MAX_SCENARIO_KEY_LEN {
        return Err(CoreError::Validation(format!(
            "Scenario key must not exceed {MAX_SCENARIO_KEY_LEN} characters"
        )));
    }
    if key.chars().any(char::is_control) {
        return Err(CoreError::Validation(
            "Scenario key must not contain control characters".to_string(),
        ));
    }
    Ok(())
}

/// Reduce a scenario key to characters safe for ids and directory names.
///
/// Alphanumerics, `-` and `_` are kept; everything else becomes `-`.
pub fn slugify(key: &str) -> String {
    key.chars()
        .take(MAX_ID_SLUG_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Derive a fresh job id from the class and scenario key.
///
/// The UUIDv7 suffix makes ids unique per submission and sortable by
/// creation time.
pub fn new_job_id(class: JobClass, scenario_key: &str) -> JobId {
    format!(
        "{}-{}-{}",
        class.as_str(),
        slugify(scenario_key),
        uuid::Uuid::now_v7().simple()
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_keys() {
        assert!(validate_scenario_key("scenario-A").is_ok());
        assert!(validate_scenario_key("2030 high demand").is_ok());
    }

    #[test]
    fn rejects_empty_and_blank_keys() {
        assert!(validate_scenario_key("").is_err());
        assert!(validate_scenario_key("   ").is_err());
    }

    #[test]
    fn rejects_overlong_keys() {
        assert!(validate_scenario_key(&"k".repeat(129)).is_err());
        assert!(validate_scenario_key(&"k".repeat(128)).is_ok());
    }

    #[test]
    fn rejects_control_characters() {
        assert!(validate_scenario_key("a\nb").is_err());
    }

    #[test]
    fn slugify_replaces_unsafe_characters() {
        assert_eq!(slugify("north/grid 2030"), "north-grid-2030");
        assert_eq!(slugify("../etc"), "---etc");
    }

    #[test]
    fn job_ids_are_unique_and_prefixed() {
        let a = new_job_id(JobClass::Forecast, "scenario-A");
        let b = new_job_id(JobClass::Forecast, "scenario-A");
        assert_ne!(a, b);
        assert!(a.starts_with("forecast-scenario-A-"));
    }
}
