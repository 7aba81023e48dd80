//! # wormhole-cli
//!
//! Command-line host for wormhole tunnel switches.
//!
//! Provides commands for:
//! - Turning switches on until interrupted (`up`)
//! - Driving switches from another process over stdin/stdout (`serve`)
//! - Inspecting the derived subdomain and tunnel client command
//! - Notebook token discovery
//! - Writing a sample configuration
//!
//! All tunnel logic lives in `wormhole-tunnel`; this crate only parses
//! arguments, loads configuration and renders output.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format, InitConfigArgs, UpArgs};
pub use error::CliError;
pub use output::OutputFormat;
