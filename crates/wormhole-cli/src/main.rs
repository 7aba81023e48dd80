//! Wormhole CLI binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wormhole_cli::cli::{Cli, Commands};
use wormhole_cli::commands::{
    InitConfigCommand, ServeCommand, ShowCommand, SubdomainCommand, TokenCommand, UpCommand,
    load_config,
};
use wormhole_cli::output::OutputFormat;

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "wormhole=info";

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<(), wormhole_cli::CliError> {
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    if let Commands::InitConfig(args) = &cli.command {
        return InitConfigCommand::new().execute(&mut stdout, &format, args);
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Up(args) => {
            let cmd = UpCommand::new(config);
            cmd.execute(&mut stdout, &format, &args).await?;
        }
        Commands::Serve => {
            let cmd = ServeCommand::new(config);
            cmd.execute(&mut stdout).await?;
        }
        Commands::Subdomain => {
            let cmd = SubdomainCommand::new(config);
            cmd.execute(&mut stdout, &format)?;
        }
        Commands::ShowCommand { name } => {
            let cmd = ShowCommand::new(config);
            cmd.execute(&mut stdout, &format, &name).await?;
        }
        Commands::Token => {
            let cmd = TokenCommand::new(config);
            cmd.execute(&mut stdout, &format).await?;
        }
        Commands::InitConfig(_) => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use wormhole_cli::cli::Format;

    #[test]
    fn cli_parses_up_with_only() {
        let cli = Cli::parse_from(["wormhole", "up", "--only", "remote-debug"]);
        match cli.command {
            Commands::Up(args) => assert_eq!(args.only, vec!["remote-debug"]),
            other => unreachable!("expected up, got {other:?}"),
        }
    }

    #[test]
    fn cli_parses_show_command() {
        let cli = Cli::parse_from(["wormhole", "show-command", "public-access"]);
        assert!(matches!(cli.command, Commands::ShowCommand { ref name } if name == "public-access"));
    }

    #[test]
    fn cli_respects_format_flag() {
        let cli = Cli::parse_from(["wormhole", "--format", "json", "subdomain"]);
        assert_eq!(cli.format, Format::Json);
    }

    #[test]
    fn cli_respects_config_flag() {
        let cli = Cli::parse_from(["wormhole", "-c", "/etc/wormhole.toml", "serve"]);
        assert_eq!(cli.config.as_deref(), Some(Path::new("/etc/wormhole.toml")));
    }

    #[test]
    fn cli_init_config_defaults() {
        let cli = Cli::parse_from(["wormhole", "init-config"]);
        match cli.command {
            Commands::InitConfig(args) => {
                assert_eq!(args.output, Path::new("wormhole.toml"));
                assert!(!args.force);
            }
            other => unreachable!("expected init-config, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_with_missing_config_file_fails() {
        let cli = Cli::parse_from(["wormhole", "-c", "/nonexistent/wormhole.toml", "subdomain"]);
        let result = run(cli).await;
        assert!(result.is_err());
    }
}
