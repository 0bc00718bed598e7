//! Naming validation for indexes, fields and sorters.
//!
//! User-provided identifiers end up in storage keys, so they are restricted
//! to word characters (the equivalent of `^\w+$`). A handful of ids are
//! reserved because the index engine uses them for its own bookkeeping.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Field ids reserved for index-engine bookkeeping.
pub static RESERVED_FIELD_IDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    let mut set = HashSet::new();
    set.insert("_id");
    set.insert("_data");
    set.insert("_sorters");
    set
});

/// Sorter ids reserved for index-engine bookkeeping.
pub static RESERVED_SORTER_IDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    let mut set = HashSet::new();
    set.insert("_id");
    set.insert("_data");
    set
});

/// Validation error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Name is empty (or a required list is)
    Empty,
    /// Name contains characters outside `[A-Za-z0-9_]`
    InvalidCharacters(String),
    /// Name is reserved for internal use
    Reserved(String),
    /// Two definitions share one id
    Duplicate(String),
    /// Type or filter the engine does not advertise
    UnknownCapability(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Empty => write!(f, "Name cannot be empty"),
            ValidationError::InvalidCharacters(name) => write!(
                f,
                "Name '{}' contains invalid characters (only alphanumeric and underscore allowed)",
                name
            ),
            ValidationError::Reserved(name) => {
                write!(f, "Name '{}' is reserved and cannot be used", name)
            }
            ValidationError::Duplicate(name) => {
                write!(f, "Duplicate definition id '{}'", name)
            }
            ValidationError::UnknownCapability(name) => {
                write!(f, "Unknown type or filter '{}'", name)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// True when `name` consists of word characters only (`^\w+$`).
pub fn is_word(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_word(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Empty);
    }
    if !is_word(name) {
        return Err(ValidationError::InvalidCharacters(name.to_string()));
    }
    Ok(())
}

/// Validate an index name.
pub fn validate_index_name(name: &str) -> Result<(), ValidationError> {
    validate_word(name)
}

/// Validate a field id against the word rule and the reserved set.
pub fn validate_field_id(id: &str) -> Result<(), ValidationError> {
    validate_word(id)?;
    if RESERVED_FIELD_IDS.contains(id) {
        return Err(ValidationError::Reserved(id.to_string()));
    }
    Ok(())
}

/// Validate a sorter id against the word rule and the reserved set.
pub fn validate_sorter_id(id: &str) -> Result<(), ValidationError> {
    validate_word(id)?;
    if RESERVED_SORTER_IDS.contains(id) {
        return Err(ValidationError::Reserved(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_rule() {
        assert!(is_word("myapp"));
        assert!(is_word("num_comments"));
        assert!(is_word("a1"));
        assert!(!is_word(""));
        assert!(!is_word("my-app"));
        assert!(!is_word("my app"));
        assert!(!is_word("café"));
    }

    #[test]
    fn test_reserved_field_ids() {
        assert!(validate_field_id("status").is_ok());
        assert_eq!(
            validate_field_id("_id"),
            Err(ValidationError::Reserved("_id".to_string()))
        );
        assert_eq!(
            validate_field_id("_sorters"),
            Err(ValidationError::Reserved("_sorters".to_string()))
        );
    }

    #[test]
    fn test_reserved_sorter_ids() {
        // `_sorters` is reserved for fields but allowed for sorters.
        assert!(validate_sorter_id("_sorters").is_ok());
        assert!(validate_sorter_id("created").is_ok());
        assert_eq!(
            validate_sorter_id("_data"),
            Err(ValidationError::Reserved("_data".to_string()))
        );
    }

    #[test]
    fn test_empty_and_invalid() {
        assert_eq!(validate_index_name(""), Err(ValidationError::Empty));
        assert_eq!(
            validate_index_name("bad name"),
            Err(ValidationError::InvalidCharacters("bad name".to_string()))
        );
    }
}
