//! Error types for tunnel switch operations.
//!
//! Every failure is local to a single controller and is reported through the
//! operation's result. Discovery errors are non-fatal: controllers log them
//! and publish status without a token.

use thiserror::Error;

/// Result type alias for tunnel operations.
pub type Result<T> = std::result::Result<T, TunnelError>;

/// Errors that can occur while managing tunnel switches.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The tunnel client (or notebook server) could not be started.
    #[error("failed to launch '{program}': {reason}")]
    LaunchFailed {
        /// The program that was being launched.
        program: String,
        /// The underlying OS error or validation failure.
        reason: String,
    },

    /// `turn_on` was called while a process is already owned.
    #[error("switch '{name}' is already running (pid {pid})")]
    AlreadyRunning {
        /// Switch name.
        name: String,
        /// Process id of the live tunnel client.
        pid: u32,
    },

    /// The switch owns no process.
    ///
    /// Reserved for callers that need to name the condition. `turn_off` on
    /// an Off switch reports `Transition::Unchanged` instead.
    #[error("switch '{name}' is not running")]
    NotRunning {
        /// Switch name.
        name: String,
    },

    /// No switch with this name is configured.
    #[error("no switch named '{name}'")]
    UnknownSwitch {
        /// The requested name.
        name: String,
    },

    /// The discovery command could not be executed.
    #[error("token discovery failed: {reason}")]
    DiscoveryFailed {
        /// Why discovery could not run.
        reason: String,
    },

    /// The discovery command never reported a token in time.
    #[error("token discovery timed out after {timeout_ms}ms")]
    DiscoveryTimeout {
        /// The overall discovery bound in milliseconds.
        timeout_ms: u64,
    },

    /// Configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// The relay auth token has an invalid format.
    #[error("invalid auth token: {message}")]
    InvalidToken {
        /// Description of the format error.
        message: String,
    },

    /// The relay auth token source does not exist.
    #[error("auth token not found: {location}")]
    TokenNotFound {
        /// Where the token was expected.
        location: String,
    },

    /// No machine identifier is available to derive a subdomain from.
    #[error("machine identifier unavailable: {reason}")]
    MachineIdUnavailable {
        /// What was tried.
        reason: String,
    },

    /// A running process could not be signalled.
    #[error("failed to stop '{name}': {reason}")]
    TerminateFailed {
        /// Switch name.
        name: String,
        /// Why the signal failed.
        reason: String,
    },
}

impl TunnelError {
    /// Creates a `LaunchFailed` error.
    #[must_use]
    pub fn launch_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LaunchFailed {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `AlreadyRunning` error.
    #[must_use]
    pub fn already_running(name: impl Into<String>, pid: u32) -> Self {
        Self::AlreadyRunning {
            name: name.into(),
            pid,
        }
    }

    /// Creates a `NotRunning` error.
    #[must_use]
    pub fn not_running(name: impl Into<String>) -> Self {
        Self::NotRunning { name: name.into() }
    }

    /// Creates an `UnknownSwitch` error.
    #[must_use]
    pub fn unknown_switch(name: impl Into<String>) -> Self {
        Self::UnknownSwitch { name: name.into() }
    }

    /// Creates a `DiscoveryFailed` error.
    #[must_use]
    pub fn discovery_failed(reason: impl Into<String>) -> Self {
        Self::DiscoveryFailed {
            reason: reason.into(),
        }
    }

    /// Creates a `DiscoveryTimeout` error.
    #[must_use]
    pub fn discovery_timeout(timeout_ms: u64) -> Self {
        Self::DiscoveryTimeout { timeout_ms }
    }

    /// Creates an `InvalidConfig` error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a `TokenNotFound` error.
    #[must_use]
    pub fn token_not_found(location: impl Into<String>) -> Self {
        Self::TokenNotFound {
            location: location.into(),
        }
    }

    /// Creates a `MachineIdUnavailable` error.
    #[must_use]
    pub fn machine_id_unavailable(reason: impl Into<String>) -> Self {
        Self::MachineIdUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates a `TerminateFailed` error.
    #[must_use]
    pub fn terminate_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TerminateFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if retrying the operation later may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DiscoveryFailed { .. }
                | Self::DiscoveryTimeout { .. }
                | Self::AlreadyRunning { .. }
                | Self::TerminateFailed { .. }
        )
    }

    /// Returns `true` if this error indicates a configuration problem.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::InvalidToken { .. }
                | Self::TokenNotFound { .. }
                | Self::MachineIdUnavailable { .. }
        )
    }
}
