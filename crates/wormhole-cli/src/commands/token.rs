//! Token command implementation.

use std::io::Write;
use std::sync::Arc;

use wormhole_tunnel::{ProcessLauncher, SystemLauncher, TokenDiscovery, WormholeConfig};

use crate::error::CliError;
use crate::output::{OutputFormat, TokenInfo};

/// Token command executor.
pub struct TokenCommand {
    config: WormholeConfig,
    launcher: Arc<dyn ProcessLauncher>,
}

impl TokenCommand {
    /// Create a new token command running real processes.
    #[must_use]
    pub fn new(config: WormholeConfig) -> Self {
        Self {
            config,
            launcher: Arc::new(SystemLauncher::new()),
        }
    }

    /// Execute the token command.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery fails, times out, or output fails.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
    ) -> Result<(), CliError> {
        let discovery = TokenDiscovery::from_config(&self.config.jupyter)?;
        let token = discovery.discover(self.launcher.as_ref()).await?;
        format.write(writer, &TokenInfo { token })
    }
}
