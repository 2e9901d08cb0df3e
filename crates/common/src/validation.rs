//! Guards for values that arrive from frames, guard clients and config files.

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::fmt::Display;

/// Longest accepted identifier (guard ids, grammar ids)
pub const MAX_ID_LENGTH: usize = 256;

/// Largest encoded image accepted per request (20 MiB)
pub const MAX_IMAGE_PAYLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Longest accepted grammar pattern
pub const MAX_REGEX_LENGTH: usize = 1024;

/// Most capture groups a grammar pattern may open
pub const MAX_REGEX_GROUPS: usize = 10;

/// Nested quantifiers that backtrack badly
const NESTED_QUANTIFIERS: [&str; 4] = ["(.*)*", "(.+)+", "(a*)*", "(a+)+"];

pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        bail!(
            "{} is {} bytes long, limit is {}",
            field_name,
            value.len(),
            max_length
        );
    }
    Ok(())
}

/// Reject blank strings (whitespace only counts as blank)
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{} cannot be empty", field_name);
    }
    Ok(())
}

/// Non-blank, bounded and free of control characters
pub fn validate_id(id: &str, field_name: &str) -> Result<()> {
    validate_non_empty(id, field_name)?;
    validate_length(id, MAX_ID_LENGTH, field_name)?;
    if let Some(c) = id.chars().find(|c| c.is_control()) {
        bail!("{} contains control character {:?}", field_name, c);
    }
    Ok(())
}

/// Compile a configured pattern after rejecting oversized or
/// catastrophic-backtracking shapes.
pub fn validate_regex_pattern(pattern: &str) -> Result<Regex> {
    validate_length(pattern, MAX_REGEX_LENGTH, "regex pattern")?;

    let groups = pattern.matches('(').count();
    if groups > MAX_REGEX_GROUPS {
        bail!(
            "regex pattern opens {} groups, limit is {}",
            groups,
            MAX_REGEX_GROUPS
        );
    }

    if let Some(nested) = NESTED_QUANTIFIERS.iter().find(|n| pattern.contains(*n)) {
        bail!("regex pattern contains nested quantifier {}", nested);
    }

    Regex::new(pattern).with_context(|| format!("invalid regex pattern {:?}", pattern))
}

/// Inclusive range check for numeric settings
pub fn validate_range<T: PartialOrd + Display>(value: T, min: T, max: T, field_name: &str) -> Result<()> {
    if value < min || value > max {
        bail!("{} must be in [{}, {}], got {}", field_name, min, max, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("guard-17", "guard_id").is_ok());
        assert!(validate_id("COL_CARRO", "grammar id").is_ok());

        assert!(validate_id("", "id").is_err());
        assert!(validate_id("  ", "id").is_err());
        assert!(validate_id("bad\nid", "id").is_err());
        assert!(validate_id(&"a".repeat(300), "id").is_err());
    }

    #[test]
    fn test_validate_regex_pattern() {
        let re = validate_regex_pattern("^[A-Z]{3}[0-9]{3}$").unwrap();
        assert!(re.is_match("ABC123"));

        assert!(validate_regex_pattern("(.*)*").is_err());
        assert!(validate_regex_pattern("(a+)+").is_err());
        assert!(validate_regex_pattern("[unclosed").is_err());
        assert!(validate_regex_pattern("((((((((((((x))))))))))))").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range(0.5, 0.0, 1.0, "threshold").is_ok());
        assert!(validate_range(1.0, 0.0, 1.0, "threshold").is_ok());
        assert!(validate_range(1.5, 0.0, 1.0, "threshold").is_err());
        assert!(validate_range(0u32, 1, 64, "tiles").is_err());
    }

    #[test]
    fn test_error_messages_name_the_field() {
        let err = validate_non_empty(" ", "guard_id").unwrap_err();
        assert_eq!(err.to_string(), "guard_id cannot be empty");
    }
}
