//! Port numbers.

use std::fmt;

use crate::error::ValidationError;

/// A TCP port in `1..=65535`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Port(u16);

impl Port {
    /// Wraps a non-zero port.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for port 0.
    pub fn new(port: u16) -> Result<Self, ValidationError> {
        if port == 0 {
            return Err(ValidationError::out_of_range("port", 1, 65535, 0));
        }
        Ok(Self(port))
    }

    /// The port number.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parses a decimal port; local ports are configured as text.
///
/// # Errors
///
/// Returns `ValidationError` unless the trimmed text is a number in
/// `1..=65535`.
pub fn parse_port(text: &str) -> Result<Port, ValidationError> {
    const FIELD: &str = "port";
    let text = text.trim();

    if text.is_empty() {
        return Err(ValidationError::empty(FIELD));
    }
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::malformed(FIELD, "a decimal port number", text));
    }

    // Digits only, so the only parse failure left is overflow.
    let wide: u64 = text.parse().unwrap_or(u64::MAX);
    let port = u16::try_from(wide)
        .map_err(|_| ValidationError::out_of_range(FIELD, 1, 65535, wide))?;
    Port::new(port)
}
