//! Relay authentication for the tunnel client.
//!
//! The relay shares one secret with every client. It is never compiled in:
//! it comes from the configuration, a file, or an environment variable.
//!
//! # Example
//!
//! ```rust,no_run
//! use wormhole_tunnel::auth::{AuthMethod, resolve_auth_token};
//!
//! # async fn example() -> wormhole_tunnel::Result<()> {
//! let method = AuthMethod::token_env("INLETS_TOKEN");
//! let token = resolve_auth_token(&method).await?;
//! println!("resolved {token:?}");
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, TunnelError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use wormhole_validation::sanitize_auth_token;

/// Default environment variable holding the relay token.
pub const DEFAULT_TOKEN_ENV: &str = "INLETS_TOKEN";

/// Where the relay token comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMethod {
    /// Token given inline in the configuration.
    Token {
        /// The token value.
        value: String,
    },

    /// Token read from a file (surrounding whitespace is ignored).
    TokenFile {
        /// Path to the file containing the token.
        path: PathBuf,
    },

    /// Token from an environment variable.
    TokenEnv {
        /// Name of the environment variable.
        var_name: String,
    },
}

impl AuthMethod {
    /// Creates a `Token` method.
    #[must_use]
    pub fn token(value: impl Into<String>) -> Self {
        Self::Token {
            value: value.into(),
        }
    }

    /// Creates a `TokenFile` method.
    #[must_use]
    pub fn token_file(path: impl Into<PathBuf>) -> Self {
        Self::TokenFile { path: path.into() }
    }

    /// Creates a `TokenEnv` method.
    #[must_use]
    pub fn token_env(var_name: impl Into<String>) -> Self {
        Self::TokenEnv {
            var_name: var_name.into(),
        }
    }

    /// Human readable description of the source, never the value itself.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Token { .. } => "inline token".to_string(),
            Self::TokenFile { path } => format!("file {}", path.display()),
            Self::TokenEnv { var_name } => format!("environment variable '{var_name}'"),
        }
    }
}

impl Default for AuthMethod {
    fn default() -> Self {
        Self::token_env(DEFAULT_TOKEN_ENV)
    }
}

/// A validated relay token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Validates and wraps a raw token.
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::InvalidToken` if the token is empty or contains
    /// whitespace or control characters.
    pub fn new(raw: &str) -> Result<Self> {
        let token =
            sanitize_auth_token(raw).map_err(|e| TunnelError::invalid_token(e.reason.to_string()))?;
        Ok(Self(token.into_inner()))
    }

    /// The secret value, for building the launch command.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// Resolves the relay token from the given source.
///
/// # Errors
///
/// - `TunnelError::TokenNotFound` if the file or variable does not exist
/// - `TunnelError::InvalidToken` if the value is malformed
pub async fn resolve_auth_token(method: &AuthMethod) -> Result<AuthToken> {
    match method {
        AuthMethod::Token { value } => AuthToken::new(value),

        AuthMethod::TokenFile { path } => {
            if !path.exists() {
                return Err(TunnelError::token_not_found(format!(
                    "file not found: {}",
                    path.display()
                )));
            }

            let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                TunnelError::token_not_found(format!(
                    "failed to read file {}: {e}",
                    path.display()
                ))
            })?;

            AuthToken::new(&content)
        }

        AuthMethod::TokenEnv { var_name } => {
            let value = std::env::var(var_name).map_err(|_| {
                TunnelError::token_not_found(format!("environment variable '{var_name}' not set"))
            })?;

            AuthToken::new(&value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_auth_method_default() {
        let method = AuthMethod::default();
        assert!(matches!(method, AuthMethod::TokenEnv { var_name } if var_name == "INLETS_TOKEN"));
    }

    #[test]
    fn test_auth_method_toml_shape() {
        let method: AuthMethod =
            toml::from_str("type = \"token_file\"\npath = \"/etc/wormhole/token\"\n")
                .expect("should deserialize");
        assert_eq!(method, AuthMethod::token_file("/etc/wormhole/token"));

        let json = serde_json::to_string(&AuthMethod::token_env("RELAY")).expect("serialize");
        assert!(json.contains("\"type\":\"token_env\""));
    }

    #[test]
    fn test_describe_hides_value() {
        let method = AuthMethod::token("super-secret");
        assert_eq!(method.describe(), "inline token");
        assert!(!method.describe().contains("super-secret"));
    }

    #[test]
    fn test_auth_token_debug_redacted() {
        let token = AuthToken::new("8dfe81c68460c8b2").expect("valid");
        assert_eq!(format!("{token:?}"), "AuthToken(***)");
        assert_eq!(token.expose(), "8dfe81c68460c8b2");
    }

    #[tokio::test]
    async fn test_resolve_inline_token_trimmed() {
        let token = resolve_auth_token(&AuthMethod::token("  abc123  "))
            .await
            .expect("should resolve");
        assert_eq!(token.expose(), "abc123");
    }

    #[tokio::test]
    async fn test_resolve_inline_token_invalid() {
        let err = resolve_auth_token(&AuthMethod::token("abc 123"))
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::InvalidToken { .. }));

        let err = resolve_auth_token(&AuthMethod::token("   ")).await.unwrap_err();
        assert!(matches!(err, TunnelError::InvalidToken { .. }));
    }

    #[tokio::test]
    async fn test_resolve_token_from_file() {
        let mut file = NamedTempFile::new().expect("should create temp file");
        writeln!(file, "  filetoken123  ").expect("should write");

        let token = resolve_auth_token(&AuthMethod::token_file(file.path()))
            .await
            .expect("should resolve");
        assert_eq!(token.expose(), "filetoken123");
    }

    #[tokio::test]
    async fn test_resolve_token_file_not_found() {
        let err = resolve_auth_token(&AuthMethod::token_file("/nonexistent/wormhole/token"))
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::TokenNotFound { .. }));
        assert!(err.to_string().contains("file not found"));
    }

    #[tokio::test]
    async fn test_resolve_token_from_env() {
        unsafe { std::env::set_var("WORMHOLE_TEST_TOKEN_VALID", "envtoken123") };

        let token = resolve_auth_token(&AuthMethod::token_env("WORMHOLE_TEST_TOKEN_VALID"))
            .await
            .expect("should resolve");
        assert_eq!(token.expose(), "envtoken123");

        unsafe { std::env::remove_var("WORMHOLE_TEST_TOKEN_VALID") };
    }

    #[tokio::test]
    async fn test_resolve_token_env_not_set() {
        unsafe { std::env::remove_var("WORMHOLE_TEST_TOKEN_UNSET") };

        let err = resolve_auth_token(&AuthMethod::token_env("WORMHOLE_TEST_TOKEN_UNSET"))
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::TokenNotFound { .. }));
        assert!(err.to_string().contains("not set"));
    }
}
