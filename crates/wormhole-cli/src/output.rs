//! Rendering command results as a table or as JSON.

use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use wormhole_tunnel::TunnelStatus;

use crate::cli::Format;
use crate::error::CliError;

/// Renders results in the format picked with `--format`.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Renders as `format`.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Whether output is machine readable.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Writes `value`: pretty JSON plus a newline, or its table form.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value).map_err(|e| {
                    if e.is_io() {
                        CliError::Io(e.into())
                    } else {
                        CliError::Format(format!("cannot encode JSON: {e}"))
                    }
                })?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Renders `value` into a string.
    ///
    /// # Errors
    ///
    /// See [`OutputFormat::write`].
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("output is not UTF-8: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Human readable rendering of a result.
pub trait TableDisplay {
    /// Writes the table form.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Statuses of several switches.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct StatusList {
    /// One entry per switch.
    pub switches: Vec<TunnelStatus>,
}

impl TableDisplay for StatusList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.switches.is_empty() {
            writeln!(writer, "No switches enabled")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<16}  {:<5}  {:>7}  {:<44}  {}",
            "NAME", "STATE", "PID", "URL", "TOKEN"
        )?;
        writeln!(writer, "{}", "─".repeat(90))?;

        for status in &self.switches {
            let state = if status.is_on { "on" } else { "off" };
            let pid = status.pid.map_or_else(|| "-".to_string(), |pid| pid.to_string());
            writeln!(
                writer,
                "{:<16}  {:<5}  {:>7}  {:<44}  {}",
                truncate(&status.name, 16),
                state,
                pid,
                status.public_url.as_deref().unwrap_or("-"),
                status.token.as_deref().unwrap_or("-"),
            )?;
            if let Some(exit) = &status.last_exit {
                writeln!(writer, "  last exit: {exit}")?;
            }
        }
        Ok(())
    }
}

/// The identity this machine tunnels under.
#[derive(Debug, Clone, Serialize)]
pub struct SubdomainInfo {
    /// Subdomain label.
    pub subdomain: String,
    /// Public host of the plain switch.
    pub public_host: String,
    /// Public host of the notebook switch.
    pub debug_host: String,
}

impl TableDisplay for SubdomainInfo {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Subdomain:    {}", self.subdomain)?;
        writeln!(writer, "Public host:  {}", self.public_host)?;
        writeln!(writer, "Debug host:   {}", self.debug_host)?;
        Ok(())
    }
}

/// A switch's tunnel client command line.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchCommand {
    /// Switch name.
    pub name: String,
    /// Command with the token masked.
    pub command: String,
}

impl TableDisplay for LaunchCommand {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "{}", self.command)?;
        Ok(())
    }
}

/// A discovered notebook token.
#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    /// The token.
    pub token: String,
}

impl TableDisplay for TokenInfo {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "{}", self.token)?;
        Ok(())
    }
}

/// Result of `init-config`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigWritten {
    /// Path of the written file.
    pub path: PathBuf,
}

impl TableDisplay for ConfigWritten {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Wrote sample configuration to {}", self.path.display())?;
        Ok(())
    }
}

/// Shortens `s` to `width` characters, ending in `...` when cut.
fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let kept: String = s.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}
