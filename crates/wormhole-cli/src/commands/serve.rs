//! Serve command implementation.
//!
//! A line-oriented control loop standing in for the host platform: one
//! command per input line, one JSON reply per output line.
//!
//! ```text
//! on public-access      {"ok":true,"transition":"started","status":{...}}
//! status                {"ok":true,"switches":[...]}
//! off nope              {"ok":false,"error":"no switch named 'nope'"}
//! ```

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use wormhole_tunnel::{
    ProcessLauncher, Switchboard, SystemLauncher, Transition, TunnelError, TunnelStatus,
    WormholeConfig,
};

use crate::commands::shutdown_signal;
use crate::error::CliError;

/// A parsed control line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlLine {
    /// A command for the switchboard.
    Request(ControlRequest),
    /// `quit` or `exit`: stop reading input.
    Quit,
}

/// A command answered with one reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    /// `on <name>`
    On(String),
    /// `off <name>`
    Off(String),
    /// `status [name]`
    Status(Option<String>),
    /// `list`
    List,
}

impl ControlLine {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns a message for unknown commands or wrong arguments.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let arg = words.next().map(str::to_string);
        if words.next().is_some() {
            return Err(format!("too many arguments for '{verb}'"));
        }

        let request = match (verb, arg) {
            ("quit" | "exit", None) => return Ok(Some(Self::Quit)),
            ("on", Some(name)) => ControlRequest::On(name),
            ("off", Some(name)) => ControlRequest::Off(name),
            ("on" | "off", None) => return Err(format!("'{verb}' needs a switch name")),
            ("status", name) => ControlRequest::Status(name),
            ("list", None) => ControlRequest::List,
            ("list" | "quit" | "exit", Some(_)) => {
                return Err(format!("'{verb}' takes no arguments"));
            }
            _ => return Err(format!("unknown command '{verb}'")),
        };
        Ok(Some(Self::Request(request)))
    }
}

/// One reply line.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControlReply {
    /// Whether the request succeeded.
    pub ok: bool,
    /// What a toggle did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,
    /// Status of the addressed switch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TunnelStatus>,
    /// Status of every switch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switches: Option<Vec<TunnelStatus>>,
    /// Switch names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether repeating a failed toggle may succeed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ControlReply {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Serve command executor.
pub struct ServeCommand {
    config: WormholeConfig,
    launcher: Arc<dyn ProcessLauncher>,
}

impl ServeCommand {
    /// Create a new serve command launching real processes.
    #[must_use]
    pub fn new(config: WormholeConfig) -> Self {
        Self {
            config,
            launcher: Arc::new(SystemLauncher::new()),
        }
    }

    /// Use a different process launcher.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Serve stdin until `quit`, end of input, Ctrl-C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the switchboard cannot be built or I/O fails.
    pub async fn execute<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let stdin = BufReader::new(tokio::io::stdin());
        self.execute_with(stdin, writer, shutdown_signal()).await
    }

    /// Serve `reader` until `quit`, end of input or `shutdown`.
    ///
    /// Every switch is turned off before returning, including when reading
    /// or writing fails.
    ///
    /// # Errors
    ///
    /// See [`ServeCommand::execute`].
    pub async fn execute_with<R, W, F>(
        &self,
        reader: R,
        writer: &mut W,
        shutdown: F,
    ) -> Result<(), CliError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
        F: Future<Output = ()>,
    {
        let board = Switchboard::from_config(&self.config, Arc::clone(&self.launcher)).await?;
        info!(switches = ?board.names(), "accepting switch commands");

        let served = answer(&board, reader, writer, shutdown).await;
        let failures = board.shutdown().await;
        served?;
        match failures.into_iter().next() {
            Some((_, e)) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// Replies to each line of `reader` until `quit`, end of input or `shutdown`.
async fn answer<R, W, F>(
    board: &Switchboard,
    reader: R,
    writer: &mut W,
    shutdown: F,
) -> Result<(), CliError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    F: Future<Output = ()>,
{
    let mut lines = reader.lines();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            () = &mut shutdown => None,
        };
        let Some(line) = line else {
            return Ok(());
        };

        let request = match ControlLine::parse(&line) {
            Ok(Some(ControlLine::Request(request))) => request,
            Ok(Some(ControlLine::Quit)) => return Ok(()),
            Ok(None) => continue,
            Err(message) => {
                write_reply(writer, &ControlReply::failure(message))?;
                continue;
            }
        };

        debug!(?request, "control request");
        let reply = handle(board, request).await;
        write_reply(writer, &reply)?;
    }
}

async fn handle(board: &Switchboard, request: ControlRequest) -> ControlReply {
    match request {
        ControlRequest::On(name) => toggle(board, &name, board.turn_on(&name).await).await,
        ControlRequest::Off(name) => toggle(board, &name, board.turn_off(&name).await).await,
        ControlRequest::Status(Some(name)) => match board.get(&name) {
            Some(switch) => ControlReply {
                ok: true,
                status: Some(switch.status().await),
                ..ControlReply::default()
            },
            None => ControlReply::failure(TunnelError::unknown_switch(name).to_string()),
        },
        ControlRequest::Status(None) => ControlReply {
            ok: true,
            switches: Some(board.statuses().await),
            ..ControlReply::default()
        },
        ControlRequest::List => ControlReply {
            ok: true,
            names: Some(board.names()),
            ..ControlReply::default()
        },
    }
}

async fn toggle(
    board: &Switchboard,
    name: &str,
    result: wormhole_tunnel::Result<Transition>,
) -> ControlReply {
    match result {
        Ok(transition) => ControlReply {
            ok: true,
            transition: Some(transition),
            status: match board.get(name) {
                Some(switch) => Some(switch.status().await),
                None => None,
            },
            ..ControlReply::default()
        },
        Err(e) => ControlReply {
            retryable: Some(e.is_recoverable()),
            ..ControlReply::failure(e.to_string())
        },
    }
}

fn write_reply<W: Write>(writer: &mut W, reply: &ControlReply) -> Result<(), CliError> {
    serde_json::to_writer(&mut *writer, reply).map_err(|e| {
        if e.is_io() {
            CliError::Io(e.into())
        } else {
            CliError::Format(format!("JSON serialization failed: {e}"))
        }
    })?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
