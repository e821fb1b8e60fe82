//! Language tags attached to localized names.

use crate::error::EntityError;

/// Language used when none is requested, and the first fallback on read.
pub const DEFAULT_LANGUAGE: &str = "en";

pub(crate) fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// Checks a tag of the form `xx` or `xxx`, optionally followed by
/// `-subtag` parts of 2 to 8 ASCII letters or digits (`pt-br`, `zh-hant`).
pub fn validate_language(tag: &str) -> Result<(), EntityError> {
    let mut parts = tag.split('-');
    let primary_ok = parts.next().is_some_and(|primary| {
        (2..=3).contains(&primary.len()) && primary.chars().all(|c| c.is_ascii_lowercase())
    });
    let subtags_ok = parts.all(|subtag| {
        (2..=8).contains(&subtag.len()) && subtag.chars().all(|c| c.is_ascii_alphanumeric())
    });

    if primary_ok && subtags_ok {
        Ok(())
    } else {
        Err(EntityError::InvalidLanguage(tag.to_string()))
    }
}
