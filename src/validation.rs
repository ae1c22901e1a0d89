//! Input validation for ctimap
//!
//! Checks the labels a mapping declares (types, attributes, roles) before any
//! query text is generated from them, and turns arbitrary field names into
//! segments that are safe inside a query variable.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid {1} '{0}': {2}")]
    InvalidIdentifier(String, &'static str, &'static str),

    #[error("Identifier '{0}' is too long (max {1} characters)")]
    TooLong(String, usize),

    #[error("Identifier cannot be empty")]
    Empty,

    #[error("Reserved word used as {1}: '{0}'")]
    Reserved(String, &'static str),
}

/// Maximum length for labels
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Query keywords that cannot be used as labels
const RESERVED_NAMES: &[&str] = &[
    "match", "insert", "put", "delete", "update", "fetch", "define", "undefine", "redefine",
    "reduce", "sort", "select", "offset", "limit", "require", "distinct", "return", "first",
    "isa", "has", "links", "owns", "plays", "relates", "sub", "value", "is", "or", "not", "try",
    "with", "in", "iid", "label", "let", "of", "from", "as", "fun", "struct", "entity",
    "relation", "attribute", "thing", "true", "false",
];

/// Validate a type label (entity or relation)
pub fn validate_type_label(label: &str) -> Result<(), ValidationError> {
    validate_label(label, "type label")
}

/// Validate an attribute label
pub fn validate_attribute_label(label: &str) -> Result<(), ValidationError> {
    validate_label(label, "attribute label")
}

/// Validate a role label
pub fn validate_role_label(label: &str) -> Result<(), ValidationError> {
    validate_label(label, "role label")
}

/// Core label validation
///
/// Rules:
/// - Must be 1-255 characters
/// - Only ASCII alphanumeric, underscore, and hyphen allowed
/// - Must start with a letter
/// - Cannot be a query keyword (case-insensitive)
fn validate_label(label: &str, kind: &'static str) -> Result<(), ValidationError> {
    if label.is_empty() {
        return Err(ValidationError::Empty);
    }

    if label.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong(label.to_string(), MAX_IDENTIFIER_LENGTH));
    }

    for (i, c) in label.chars().enumerate() {
        if i == 0 && !c.is_ascii_alphabetic() {
            return Err(ValidationError::InvalidIdentifier(
                label.to_string(),
                kind,
                "must start with a letter",
            ));
        }
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
            return Err(ValidationError::InvalidIdentifier(
                label.to_string(),
                kind,
                "contains invalid characters (only alphanumeric, underscore, and hyphen allowed)",
            ));
        }
    }

    if RESERVED_NAMES.contains(&label.to_lowercase().as_str()) {
        return Err(ValidationError::Reserved(label.to_string(), kind));
    }

    Ok(())
}

/// Sanitize a field name for use as a variable segment
///
/// Runs of characters outside `[A-Za-z0-9_-]` collapse into one underscore.
/// Never returns an empty string.
pub fn sanitize_segment(input: &str) -> String {
    let mut result = String::with_capacity(input.len());

    for c in input.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            result.push(c);
        } else if !result.ends_with('_') {
            result.push('_');
        }
    }

    if result.is_empty() {
        "_".to_string()
    } else {
        result
    }
}

fn id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^([a-z][a-z0-9-]*?)--([0-9A-Za-z-]+)$").ok())
        .as_ref()
}

/// Type prefix of a `<type>--<uuid>` identifier
pub fn type_prefix(id: &str) -> Option<&str> {
    id_pattern()?
        .captures(id)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_labels() {
        assert!(validate_type_label("attack-pattern").is_ok());
        assert!(validate_type_label("person").is_ok());
        assert!(validate_attribute_label("spec_version").is_ok());
        assert!(validate_attribute_label("x509-v3-extensions").is_ok());
        assert!(validate_role_label("creator").is_ok());
    }

    #[test]
    fn test_invalid_characters() {
        assert!(validate_type_label("attack pattern").is_err());
        assert!(validate_type_label("foo.bar").is_err());
        assert!(validate_type_label("foo;match").is_err());
        assert!(validate_attribute_label("name'").is_err());
        assert!(validate_role_label("$x").is_err());
    }

    #[test]
    fn test_invalid_start_characters() {
        assert!(validate_type_label("-foo").is_err());
        assert!(validate_type_label("_foo").is_err());
        assert!(validate_type_label("1foo").is_err());
    }

    #[test]
    fn test_reserved_names() {
        assert!(validate_type_label("match").is_err());
        assert!(validate_attribute_label("ISA").is_err());
        assert!(validate_role_label("links").is_err());
        assert!(validate_type_label("matches").is_ok());
    }

    #[test]
    fn test_empty_and_too_long() {
        assert!(matches!(validate_type_label(""), Err(ValidationError::Empty)));
        let long_label = "a".repeat(256);
        assert!(matches!(validate_type_label(&long_label), Err(ValidationError::TooLong(_, 255))));
    }

    #[test]
    fn test_sanitize_segment() {
        assert_eq!(sanitize_segment("created_by_ref"), "created_by_ref");
        assert_eq!(sanitize_segment("x-mitre-data"), "x-mitre-data");
        assert_eq!(sanitize_segment("hello world"), "hello_world");
        assert_eq!(sanitize_segment("a.b/c"), "a_b_c");
        assert_eq!(sanitize_segment("a  b"), "a_b");
        assert_eq!(sanitize_segment(""), "_");
    }

    #[test]
    fn test_type_prefix() {
        assert_eq!(
            type_prefix("identity--f431f809-377b-45e0-aa1c-6a4751cae5ff"),
            Some("identity")
        );
        assert_eq!(
            type_prefix("marking-definition--613f2e26-407d-48c7-9eca-b8e91df99dc9"),
            Some("marking-definition")
        );
        assert_eq!(type_prefix("p1"), None);
        assert_eq!(type_prefix("--abc"), None);
    }
}
