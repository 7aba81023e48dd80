//! Init-config command implementation.

use std::io::Write;

use tracing::info;
use wormhole_tunnel::WormholeConfig;

use crate::cli::InitConfigArgs;
use crate::error::CliError;
use crate::output::{ConfigWritten, OutputFormat};

/// Init-config command executor.
pub struct InitConfigCommand;

impl InitConfigCommand {
    /// Create a new init-config command.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Write the sample configuration.
    ///
    /// # Errors
    ///
    /// Returns `CliError::Config` if the file exists and `--force` was not
    /// given, or an I/O error if writing fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &InitConfigArgs,
    ) -> Result<(), CliError> {
        if args.output.exists() && !args.force {
            return Err(CliError::Config(format!(
                "{} already exists, use --force to overwrite",
                args.output.display()
            )));
        }

        std::fs::write(&args.output, WormholeConfig::sample())?;
        info!(path = %args.output.display(), "wrote sample configuration");

        format.write(
            writer,
            &ConfigWritten {
                path: args.output.clone(),
            },
        )
    }
}

impl Default for InitConfigCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_loadable_sample() {
        let dir = TempDir::new().expect("tempdir");
        let args = InitConfigArgs {
            output: dir.path().join("wormhole.toml"),
            force: false,
        };

        let mut out = Vec::new();
        InitConfigCommand::new()
            .execute(&mut out, &OutputFormat::default(), &args)
            .expect("write");

        let config = WormholeConfig::from_file(&args.output).expect("load");
        assert_eq!(config, WormholeConfig::default());
        assert!(String::from_utf8(out).expect("utf8").starts_with("Wrote sample configuration"));
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("wormhole.toml");
        std::fs::write(&path, "relay_host = \"relay.example.com\"\n").expect("seed");

        let mut args = InitConfigArgs {
            output: path.clone(),
            force: false,
        };
        let err = InitConfigCommand::new()
            .execute(&mut Vec::new(), &OutputFormat::default(), &args)
            .unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
        assert!(std::fs::read_to_string(&path).expect("read").contains("relay.example.com"));

        args.force = true;
        InitConfigCommand::new()
            .execute(&mut Vec::new(), &OutputFormat::default(), &args)
            .expect("overwrite");
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            WormholeConfig::sample()
        );
    }
}
