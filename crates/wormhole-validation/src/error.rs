//! Validation errors.

use thiserror::Error;

/// Why a value was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Nothing was given.
    #[error("must not be empty")]
    Empty,

    /// Longer than the protocol allows.
    #[error("{actual} characters exceeds the limit of {max}")]
    TooLong {
        /// Length limit.
        max: usize,
        /// Length given.
        actual: usize,
    },

    /// A character outside the allowed set.
    #[error("'{found}' is not allowed, expected {allowed}")]
    InvalidCharacter {
        /// Offending character or fragment.
        found: String,
        /// What is allowed instead.
        allowed: String,
    },

    /// A character a shell would interpret.
    #[error("shell metacharacter '{}' is not allowed", .found.escape_default())]
    ShellMetacharacter {
        /// Offending character.
        found: char,
    },

    /// A `..` path component.
    #[error("path traversal '{pattern}' is not allowed")]
    PathTraversal {
        /// The traversal sequence.
        pattern: String,
    },

    /// Not shaped like the expected value.
    #[error("expected {expected}, got '{actual}'")]
    Malformed {
        /// What the value should look like.
        expected: String,
        /// What was given.
        actual: String,
    },

    /// A number outside its range.
    #[error("{actual} is outside [{min}, {max}]")]
    OutOfRange {
        /// Lower bound.
        min: u64,
        /// Upper bound.
        max: u64,
        /// Value given.
        actual: u64,
    },

    /// A null byte or other control character.
    #[error("control character '{}' is not allowed", .found.escape_default())]
    ControlCharacter {
        /// Offending character.
        found: char,
    },
}

/// A rejected input value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    /// Which input was rejected.
    pub field: String,
    /// Why.
    pub reason: Rejection,
}

impl ValidationError {
    /// Rejects `field` for `reason`.
    #[must_use]
    pub fn new(field: impl Into<String>, reason: Rejection) -> Self {
        Self {
            field: field.into(),
            reason,
        }
    }

    pub(crate) fn empty(field: &str) -> Self {
        Self::new(field, Rejection::Empty)
    }

    pub(crate) fn too_long(field: &str, max: usize, actual: usize) -> Self {
        Self::new(field, Rejection::TooLong { max, actual })
    }

    pub(crate) fn invalid_character(field: &str, found: impl Into<String>, allowed: &str) -> Self {
        Self::new(
            field,
            Rejection::InvalidCharacter {
                found: found.into(),
                allowed: allowed.to_string(),
            },
        )
    }

    pub(crate) fn shell_metacharacter(field: &str, found: char) -> Self {
        Self::new(field, Rejection::ShellMetacharacter { found })
    }

    pub(crate) fn path_traversal(field: &str, pattern: &str) -> Self {
        Self::new(
            field,
            Rejection::PathTraversal {
                pattern: pattern.to_string(),
            },
        )
    }

    pub(crate) fn malformed(field: &str, expected: &str, actual: impl Into<String>) -> Self {
        Self::new(
            field,
            Rejection::Malformed {
                expected: expected.to_string(),
                actual: actual.into(),
            },
        )
    }

    pub(crate) fn out_of_range(field: &str, min: u64, max: u64, actual: u64) -> Self {
        Self::new(field, Rejection::OutOfRange { min, max, actual })
    }

    pub(crate) fn control_character(field: &str, found: char) -> Self {
        Self::new(field, Rejection::ControlCharacter { found })
    }

    /// Whether the input was rejected for being empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reason == Rejection::Empty
    }

    /// Whether the input looked like an injection attempt.
    #[must_use]
    pub fn is_injection(&self) -> bool {
        matches!(
            self.reason,
            Rejection::ShellMetacharacter { .. }
                | Rejection::PathTraversal { .. }
                | Rejection::ControlCharacter { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_field() {
        let err = ValidationError::too_long("subdomain", 63, 80);
        assert_eq!(
            err.to_string(),
            "invalid subdomain: 80 characters exceeds the limit of 63"
        );
    }

    #[test]
    fn test_control_characters_are_escaped() {
        let err = ValidationError::control_character("argument", '\n');
        assert_eq!(
            err.to_string(),
            "invalid argument: control character '\\n' is not allowed"
        );
        assert!(err.is_injection());
    }

    #[test]
    fn test_injection_classification() {
        assert!(ValidationError::shell_metacharacter("program_path", ';').is_injection());
        assert!(ValidationError::path_traversal("program_path", "..").is_injection());
        assert!(!ValidationError::out_of_range("port", 1, 65535, 0).is_injection());
        assert!(ValidationError::empty("token").is_empty());
    }
}
