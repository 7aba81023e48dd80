//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Default path written by `init-config`.
pub const DEFAULT_CONFIG_FILE: &str = "wormhole.toml";

/// Wormhole - expose local services through an inlets relay.
#[derive(Parser, Debug, Clone)]
#[command(name = "wormhole")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file. Built-in defaults are used when absent.
    #[arg(short, long, env = "WORMHOLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Emit logs as JSON lines on stderr.
    #[arg(long)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Turn switches on and keep them on until Ctrl-C.
    ///
    /// Exits once every switch has gone off on its own.
    Up(UpArgs),

    /// Control switches with line commands on stdin.
    ///
    /// Accepts `on <name>`, `off <name>`, `status [name]`, `list` and
    /// `quit`. Every reply is one JSON line on stdout.
    Serve,

    /// Print the subdomain and public hosts of this machine.
    Subdomain,

    /// Print the tunnel client command for a switch, token masked.
    ShowCommand {
        /// Switch name.
        name: String,
    },

    /// Look up the running notebook server's token once.
    Token,

    /// Write the sample configuration file.
    InitConfig(InitConfigArgs),
}

/// Arguments for the up command.
#[derive(Parser, Debug, Clone, Default)]
pub struct UpArgs {
    /// Only turn on these switches (repeatable). Defaults to all.
    #[arg(long, value_name = "NAME")]
    pub only: Vec<String>,
}

/// Arguments for the init-config command.
#[derive(Parser, Debug, Clone)]
pub struct InitConfigArgs {
    /// Where to write the file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub output: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}
