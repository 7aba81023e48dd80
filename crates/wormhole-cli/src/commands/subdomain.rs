//! Subdomain command implementation.

use std::io::Write;

use wormhole_tunnel::WormholeConfig;
use wormhole_tunnel::subdomain::resolve_subdomain;

use crate::error::CliError;
use crate::output::{OutputFormat, SubdomainInfo};

/// Subdomain command executor.
pub struct SubdomainCommand {
    config: WormholeConfig,
}

impl SubdomainCommand {
    /// Create a new subdomain command.
    #[must_use]
    pub fn new(config: WormholeConfig) -> Self {
        Self { config }
    }

    /// Execute the subdomain command.
    ///
    /// # Errors
    ///
    /// Returns an error if no subdomain can be resolved or output fails.
    pub fn execute<W: Write>(&self, writer: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        let info = self.resolve()?;
        format.write(writer, &info)
    }

    /// Resolve the subdomain and both public hosts.
    ///
    /// # Errors
    ///
    /// Returns an error if no subdomain can be resolved.
    pub fn resolve(&self) -> Result<SubdomainInfo, CliError> {
        let subdomain = resolve_subdomain(self.config.subdomain.as_deref())?;
        Ok(SubdomainInfo {
            public_host: self.config.public_host(&subdomain)?,
            debug_host: self.config.debug_host(&subdomain)?,
            subdomain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_configured_subdomain() {
        let config = WormholeConfig {
            subdomain: Some("myhouse".into()),
            ..WormholeConfig::default()
        };
        let info = SubdomainCommand::new(config).resolve().expect("resolve");
        assert_eq!(info.subdomain, "myhouse");
        assert_eq!(info.public_host, "myhouse.wormhole.eliteu.cn");
        assert_eq!(info.debug_host, "myhouse_debug.wormhole.eliteu.cn");
    }

    #[test]
    fn table_output() {
        let config = WormholeConfig {
            subdomain: Some("myhouse".into()),
            relay_host: "relay.example.com".into(),
            ..WormholeConfig::default()
        };
        let mut out = Vec::new();
        SubdomainCommand::new(config)
            .execute(&mut out, &OutputFormat::default())
            .expect("execute");
        let out = String::from_utf8(out).expect("utf8");
        assert!(out.contains("Subdomain:    myhouse"));
        assert!(out.contains("myhouse.relay.example.com"));
    }
}
