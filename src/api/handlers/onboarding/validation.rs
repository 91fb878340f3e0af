//! Display name rules for onboarding input.

use regex::Regex;
use std::sync::OnceLock;

use super::types::{FieldErrors, OnboardingInput};

pub const DISPLAY_NAME_FIELD: &str = "displayName";
pub const DISPLAY_NAME_MIN: usize = 5;
pub const DISPLAY_NAME_MAX: usize = 50;

const REQUIRED: &str = "Display name is required.";
const TOO_SHORT: &str = "Display name is too short, minimum is 5 characters.";
const TOO_LONG: &str = "Display name is too long, maximum is 50 characters.";
const INVALID_CHARACTERS: &str =
    "Display name can only contain letters, numbers, spaces, and basic punctuation.";

fn display_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[\p{L}\p{N}\s\-._]+$").ok())
        .as_ref()
}

/// Messages for a display name, empty when it is acceptable.
#[must_use]
pub fn display_name_errors(display_name: Option<&str>) -> Vec<String> {
    let Some(display_name) = display_name.filter(|name| !name.trim().is_empty()) else {
        return vec![REQUIRED.to_string()];
    };

    let mut errors = Vec::new();
    let length = display_name.chars().count();
    if length < DISPLAY_NAME_MIN {
        errors.push(TOO_SHORT.to_string());
    }
    if length > DISPLAY_NAME_MAX {
        errors.push(TOO_LONG.to_string());
    }
    let allowed = display_name_pattern().is_some_and(|pattern| pattern.is_match(display_name));
    if !allowed {
        errors.push(INVALID_CHARACTERS.to_string());
    }
    errors
}

/// Validate the whole input, returning errors keyed by JSON field name.
///
/// # Errors
/// Returns the field-keyed messages when any rule fails.
pub fn validate(input: &OnboardingInput) -> Result<String, FieldErrors> {
    let errors = display_name_errors(input.display_name.as_deref());
    if errors.is_empty() {
        Ok(input.display_name.clone().unwrap_or_default())
    } else {
        let mut fields = FieldErrors::new();
        fields.insert(DISPLAY_NAME_FIELD.to_string(), errors);
        Err(fields)
    }
}
