//! Relay names, URLs and tokens.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ValidationError;
use crate::sanitized::{AuthToken, Hostname, Sanitized, Subdomain, Url};
use crate::{MAX_HOSTNAME_LENGTH, MAX_LABEL_LENGTH, MAX_TOKEN_LENGTH, MAX_URL_LENGTH};

// Underscore is allowed inside a label: the debug host is `<subdomain>_debug`.
static LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9](?:[a-z0-9_-]*[a-z0-9])?$").unwrap_or_else(|_| unreachable!())
});

static URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://\S+$").unwrap_or_else(|_| unreachable!())
});

const SHELL_SYNTAX: &[char] = &[';', '|', '&', '$', '`', '(', ')', '{', '}', '<', '>'];

/// Trims `input` and rejects it if empty, longer than `max`, or carrying
/// control characters.
fn trimmed<'a>(field: &str, input: &'a str, max: usize) -> Result<&'a str, ValidationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ValidationError::empty(field));
    }
    if input.len() > max {
        return Err(ValidationError::too_long(field, max, input.len()));
    }
    if let Some(found) = input.chars().find(|c| c.is_control()) {
        return Err(ValidationError::control_character(field, found));
    }
    Ok(input)
}

fn no_shell_syntax(field: &str, input: &str) -> Result<(), ValidationError> {
    match input.chars().find(|c| SHELL_SYNTAX.contains(c)) {
        Some(found) => Err(ValidationError::shell_metacharacter(field, found)),
        None => Ok(()),
    }
}

fn label(field: &str, label: &str, whole: &str) -> Result<(), ValidationError> {
    if label.len() > MAX_LABEL_LENGTH {
        return Err(ValidationError::too_long(field, MAX_LABEL_LENGTH, label.len()));
    }
    if !LABEL.is_match(label) {
        return Err(ValidationError::malformed(
            field,
            "labels of a-z, 0-9, '-' or '_' that start and end alphanumeric",
            whole,
        ));
    }
    Ok(())
}

/// Checks a tunnel subdomain: one label of up to 63 characters, lowercased.
///
/// # Errors
///
/// Returns `ValidationError` if the subdomain is empty, dotted, too long or
/// contains anything outside `[a-z0-9_-]`.
pub fn sanitize_subdomain(input: &str) -> Result<Sanitized<Subdomain>, ValidationError> {
    const FIELD: &str = "subdomain";
    let input = trimmed(FIELD, input, MAX_HOSTNAME_LENGTH)?;
    no_shell_syntax(FIELD, input)?;
    if input.contains('.') {
        return Err(ValidationError::invalid_character(FIELD, ".", "a single label"));
    }

    let lower = input.to_lowercase();
    label(FIELD, &lower, input)?;
    Ok(Sanitized::checked(lower))
}

/// Checks a dotted hostname of up to 253 characters, lowercased.
///
/// # Errors
///
/// Returns `ValidationError` if any label is invalid.
pub fn sanitize_hostname(input: &str) -> Result<Sanitized<Hostname>, ValidationError> {
    const FIELD: &str = "hostname";
    let input = trimmed(FIELD, input, MAX_HOSTNAME_LENGTH)?;
    no_shell_syntax(FIELD, input)?;

    let lower = input.to_lowercase();
    lower.split('.').try_for_each(|part| label(FIELD, part, input))?;
    Ok(Sanitized::checked(lower))
}

/// Checks a `scheme://rest` URL.
///
/// # Errors
///
/// Returns `ValidationError` if the scheme is missing or the URL holds
/// whitespace or shell syntax.
pub fn sanitize_url(input: &str) -> Result<Sanitized<Url>, ValidationError> {
    const FIELD: &str = "url";
    let input = trimmed(FIELD, input, MAX_URL_LENGTH)?;
    no_shell_syntax(FIELD, input)?;
    if !URL.is_match(input) {
        return Err(ValidationError::malformed(FIELD, "scheme://host", input));
    }
    Ok(Sanitized::checked(input.to_string()))
}

/// Checks a relay auth token. It travels as a single argv entry, so inner
/// whitespace is refused; any other printable character is fine.
///
/// # Errors
///
/// Returns `ValidationError` if the token is empty, too long, or holds
/// whitespace or control characters.
pub fn sanitize_auth_token(input: &str) -> Result<Sanitized<AuthToken>, ValidationError> {
    const FIELD: &str = "auth_token";
    let input = trimmed(FIELD, input, MAX_TOKEN_LENGTH)?;
    if input.chars().any(char::is_whitespace) {
        return Err(ValidationError::invalid_character(
            FIELD,
            "whitespace",
            "printable characters without spaces",
        ));
    }
    Ok(Sanitized::checked(input.to_string()))
}
