//! Notebook token discovery.
//!
//! The notebook server lists itself as `http://host:port/?token=<token> :: <dir>`.
//! Right after the tunnel starts the server may not be registered yet, so
//! discovery retries with a doubling backoff until an overall deadline.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::Instant;
use tracing::debug;
use wormhole_validation::command::CommandOutput;

use crate::config::JupyterSwitchConfig;
use crate::error::{Result, TunnelError};
use crate::launcher::{LaunchSpec, ProcessLauncher};

/// Upper bound for the delay between two attempts.
pub const MAX_DISCOVERY_BACKOFF: Duration = Duration::from_secs(2);

static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.*=(.*)::.*$").unwrap_or_else(|_| unreachable!()));

/// Extract the token from server list output.
///
/// The first line matching `...=<token>::...` wins. Returns `None` when no
/// line matches or the captured token is blank.
///
/// ```
/// use wormhole_tunnel::discovery::parse_token;
///
/// let listing = "Currently running servers:\nhttp://localhost:8888/?token=abc123 :: /home/jovyan\n";
/// assert_eq!(parse_token(listing).as_deref(), Some("abc123"));
/// ```
#[must_use]
pub fn parse_token(output: &str) -> Option<String> {
    let captures = output.lines().find_map(|line| TOKEN_PATTERN.captures(line))?;
    let token = captures.get(1)?.as_str().trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn scan_output(output: &CommandOutput) -> Option<String> {
    parse_token(&output.stdout_lossy()).or_else(|| parse_token(&output.stderr_lossy()))
}

/// Runs the discovery command until it reports a token.
#[derive(Debug, Clone)]
pub struct TokenDiscovery {
    command: LaunchSpec,
    timeout: Duration,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl TokenDiscovery {
    /// Discovery with a 10s deadline and 250ms initial backoff.
    #[must_use]
    pub fn new(command: LaunchSpec) -> Self {
        Self {
            command,
            timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(250),
            max_backoff: MAX_DISCOVERY_BACKOFF,
        }
    }

    /// Discovery as configured for the notebook switch.
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::InvalidConfig` if the discovery command is empty.
    pub fn from_config(config: &JupyterSwitchConfig) -> Result<Self> {
        Ok(Self::new(config.discovery_spec()?)
            .with_timeout(Duration::from_millis(config.discovery_timeout_ms))
            .with_backoff(Duration::from_millis(config.discovery_retry_ms)))
    }

    /// Sets the overall deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the first retry delay. Later delays double up to the cap.
    #[must_use]
    pub fn with_backoff(mut self, initial: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = MAX_DISCOVERY_BACKOFF.max(initial);
        self
    }

    /// The command being run.
    #[must_use]
    pub fn command(&self) -> &LaunchSpec {
        &self.command
    }

    /// The overall deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run discovery.
    ///
    /// # Errors
    ///
    /// - `TunnelError::DiscoveryFailed` if the command cannot be run at all
    /// - `TunnelError::DiscoveryTimeout` if no token appeared before the deadline
    pub async fn discover(&self, launcher: &dyn ProcessLauncher) -> Result<String> {
        let deadline = Instant::now() + self.timeout;
        let timed_out = || TunnelError::discovery_timeout(self.timeout.as_millis() as u64);
        let mut backoff = self.initial_backoff;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let output = match tokio::time::timeout_at(deadline, launcher.run(&self.command)).await
            {
                Err(_) => return Err(timed_out()),
                Ok(Err(e)) => return Err(TunnelError::discovery_failed(e.to_string())),
                Ok(Ok(output)) => output,
            };

            if let Some(token) = scan_output(&output) {
                debug!(attempt, "notebook token discovered");
                return Ok(token);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out());
            }

            debug!(
                attempt,
                exit_code = output.exit_code,
                retry_ms = backoff.as_millis() as u64,
                "no notebook token yet"
            );
            tokio::time::sleep(backoff.min(remaining)).await;
            backoff = (backoff * 2).min(self.max_backoff);
        }
    }
}
