//! Show-command command implementation.
//!
//! Prints the exact tunnel client command a switch would run, with the
//! relay token masked.

use std::io::Write;

use wormhole_tunnel::WormholeConfig;
use wormhole_tunnel::auth::resolve_auth_token;
use wormhole_tunnel::subdomain::resolve_subdomain;

use crate::error::CliError;
use crate::output::{LaunchCommand, OutputFormat};

/// Show-command executor.
pub struct ShowCommand {
    config: WormholeConfig,
}

impl ShowCommand {
    /// Create a new show-command command.
    #[must_use]
    pub fn new(config: WormholeConfig) -> Self {
        Self { config }
    }

    /// Execute the show-command command.
    ///
    /// # Errors
    ///
    /// Returns an error if the switch is unknown, the subdomain or token
    /// cannot be resolved, or output fails.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        name: &str,
    ) -> Result<(), CliError> {
        let command = self.command_for(name).await?;
        format.write(writer, &command)
    }

    /// Build the redacted command line for a switch.
    ///
    /// # Errors
    ///
    /// See [`ShowCommand::execute`].
    pub async fn command_for(&self, name: &str) -> Result<LaunchCommand, CliError> {
        self.config.validate()?;
        let subdomain = resolve_subdomain(self.config.subdomain.as_deref())?;
        let token = resolve_auth_token(&self.config.auth).await?;
        let tunnel = self.config.tunnel_config_for(name, &subdomain, token)?;

        Ok(LaunchCommand {
            name: tunnel.name.clone(),
            command: tunnel.launch_spec().redacted(),
        })
    }
}
