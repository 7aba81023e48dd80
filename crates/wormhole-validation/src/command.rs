//! Starting external programs without a shell.
//!
//! The switches only ever run two programs: the `inlets` tunnel client and
//! the `jupyter` tooling. [`CheckedCommand`] restricts the program to that
//! pair (optionally at a configured path) and refuses arguments that could
//! break argv parsing.
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), wormhole_validation::command::CommandError> {
//! use wormhole_validation::command::{AllowedProgram, CheckedCommand};
//!
//! let child = CheckedCommand::new(AllowedProgram::Inlets)
//!     .program_path("/usr/local/bin/inlets")
//!     .args(["client", "--remote", "wss://myhouse.wormhole.eliteu.cn"])
//!     .spawn()?;
//! # drop(child);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, Command};

use crate::error::ValidationError;

/// The programs a switch may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AllowedProgram {
    /// The `inlets` tunnel client.
    Inlets,
    /// The `jupyter` CLI, for starting notebooks and listing servers.
    Jupyter,
}

impl AllowedProgram {
    /// Name looked up on `PATH` when no explicit path is configured.
    #[must_use]
    pub fn default_name(self) -> &'static str {
        match self {
            Self::Inlets => "inlets",
            Self::Jupyter => "jupyter",
        }
    }
}

impl fmt::Display for AllowedProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_name())
    }
}

/// Failure to start a [`CheckedCommand`].
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program path or an argument was refused.
    #[error(transparent)]
    Rejected(#[from] ValidationError),

    /// The OS could not start the program.
    #[error("failed to start program: {0}")]
    Io(#[from] std::io::Error),
}

impl CommandError {
    /// Whether the program does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Refuses an argument containing a null byte or line break.
///
/// # Errors
///
/// Returns the offending character as a [`ValidationError`].
pub fn check_argument(field: &str, arg: &str) -> Result<(), ValidationError> {
    match arg.chars().find(|c| matches!(c, '\0' | '\n' | '\r')) {
        Some(found) => Err(ValidationError::control_character(field, found)),
        None => Ok(()),
    }
}

/// Refuses a program path that is empty, walks up with `..`, or contains
/// shell syntax.
///
/// # Errors
///
/// Returns a [`ValidationError`] describing the first problem found.
pub fn validate_program_path(path: &str) -> Result<(), ValidationError> {
    const FIELD: &str = "program_path";

    if path.is_empty() {
        return Err(ValidationError::empty(FIELD));
    }
    if path.split('/').any(|component| component == "..") {
        return Err(ValidationError::path_traversal(FIELD, ".."));
    }
    check_argument(FIELD, path)?;
    if let Some(found) = path.chars().find(|c| matches!(c, ';' | '&' | '|' | '$' | '`')) {
        return Err(ValidationError::shell_metacharacter(FIELD, found));
    }
    Ok(())
}

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: Vec<u8>,
    /// Standard error.
    pub stderr: Vec<u8>,
    /// Exit code, `-1` when the process was killed by a signal.
    pub exit_code: i32,
}

impl CommandOutput {
    /// Standard output decoded lossily.
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded lossily.
    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Whether the exit code was zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Command builder for an [`AllowedProgram`].
///
/// The first refused path or argument is remembered and reported when the
/// command is started, so a builder chain never has to stop half way.
#[derive(Debug)]
pub struct CheckedCommand {
    program: AllowedProgram,
    path: Option<String>,
    args: Vec<String>,
    rejected: Option<ValidationError>,
}

impl CheckedCommand {
    /// Starts building a command for `program`.
    #[must_use]
    pub fn new(program: AllowedProgram) -> Self {
        Self {
            program,
            path: None,
            args: Vec::new(),
            rejected: None,
        }
    }

    /// Runs the program from `path` instead of looking it up on `PATH`.
    #[must_use]
    pub fn program_path(mut self, path: &str) -> Self {
        match validate_program_path(path) {
            Ok(()) => self.path = Some(path.to_string()),
            Err(e) => self.reject(e),
        }
        self
    }

    /// Appends arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            let arg = arg.as_ref();
            match check_argument("argument", arg) {
                Ok(()) => self.args.push(arg.to_string()),
                Err(e) => self.reject(e),
            }
        }
        self
    }

    /// The executable that will be started.
    #[must_use]
    pub fn program(&self) -> &str {
        self.path.as_deref().unwrap_or(self.program.default_name())
    }

    /// The first refused input, if any.
    #[must_use]
    pub fn rejection(&self) -> Option<&ValidationError> {
        self.rejected.as_ref()
    }

    fn reject(&mut self, err: ValidationError) {
        self.rejected.get_or_insert(err);
    }

    fn prepare(self) -> Result<Command, CommandError> {
        if let Some(err) = self.rejected {
            return Err(err.into());
        }
        let mut cmd = Command::new(self.path.as_deref().unwrap_or(self.program.default_name()));
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }

    /// Runs to completion and captures output. A non-zero exit is returned
    /// in [`CommandOutput::exit_code`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an input was refused or the program could not
    /// be started.
    pub async fn output(self) -> Result<CommandOutput, CommandError> {
        let output = self.prepare()?.output().await?;
        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Starts a long-lived child with piped stdout and stderr. The child is
    /// killed if the handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if an input was refused or the program could not
    /// be started.
    pub fn spawn(self) -> Result<Child, CommandError> {
        Ok(self.prepare()?.spawn()?)
    }
}
