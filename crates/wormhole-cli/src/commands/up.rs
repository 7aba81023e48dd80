//! Up command implementation.
//!
//! Turns the selected switches on, prints their status and keeps them on
//! until interrupted or until every switch has gone off by itself.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use wormhole_tunnel::{ProcessLauncher, Switchboard, SystemLauncher, TunnelError, WormholeConfig};

use crate::cli::UpArgs;
use crate::commands::shutdown_signal;
use crate::error::CliError;
use crate::output::{OutputFormat, StatusList};

/// Up command executor.
pub struct UpCommand {
    config: WormholeConfig,
    launcher: Arc<dyn ProcessLauncher>,
    poll_interval: Duration,
}

impl UpCommand {
    /// Create a new up command launching real processes.
    #[must_use]
    pub fn new(config: WormholeConfig) -> Self {
        Self {
            config,
            launcher: Arc::new(SystemLauncher::new()),
            poll_interval: Duration::from_millis(500),
        }
    }

    /// Use a different process launcher.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// How often to check whether any switch is still on.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Execute the up command until Ctrl-C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the switchboard cannot be built, no switch could
    /// be turned on, or output fails.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &UpArgs,
    ) -> Result<(), CliError> {
        self.execute_until(writer, format, args, shutdown_signal())
            .await
    }

    /// Execute the up command until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// See [`UpCommand::execute`].
    pub async fn execute_until<W, F>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &UpArgs,
        shutdown: F,
    ) -> Result<(), CliError>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        let board = Switchboard::from_config(&self.config, Arc::clone(&self.launcher)).await?;

        let held = self.hold(&board, writer, format, args, shutdown).await;
        let failures = board.shutdown().await;
        held?;

        if !format.is_json() {
            writeln!(writer, "All switches off")?;
        }
        match failures.into_iter().next() {
            Some((_, e)) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Turns the targets on, reports them and waits. The caller turns
    /// everything off afterwards, whatever this returns.
    async fn hold<W, F>(
        &self,
        board: &Switchboard,
        writer: &mut W,
        format: &OutputFormat,
        args: &UpArgs,
        shutdown: F,
    ) -> Result<(), CliError>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        let targets = select_targets(board, &args.only)?;

        let mut last_error: Option<TunnelError> = None;
        let mut started = 0usize;
        for name in &targets {
            match board.turn_on(name).await {
                Ok(_) => started += 1,
                Err(e) => {
                    error!(switch = %name, error = %e, "failed to turn on switch");
                    last_error = Some(e);
                }
            }
        }

        format.write(
            writer,
            &StatusList {
                switches: board.statuses().await,
            },
        )?;
        writer.flush()?;

        if started == 0 {
            return Err(last_error.map_or_else(
                || CliError::InvalidArgument("no switches to turn on".into()),
                CliError::from,
            ));
        }

        info!(switches = started, "switches on, press Ctrl-C to turn them off");

        tokio::select! {
            () = shutdown => {}
            () = wait_until_all_off(board, self.poll_interval) => {
                warn!("every switch went off on its own");
            }
        }
        Ok(())
    }
}

/// The switches to turn on: all of them, or the requested subset in order.
fn select_targets(board: &Switchboard, only: &[String]) -> Result<Vec<String>, CliError> {
    if only.is_empty() {
        let names = board.names();
        if names.is_empty() {
            return Err(CliError::InvalidArgument(
                "no switches are enabled in the configuration".into(),
            ));
        }
        return Ok(names);
    }

    for name in only {
        if board.get(name).is_none() {
            return Err(TunnelError::unknown_switch(name).into());
        }
    }
    Ok(only.to_vec())
}

async fn wait_until_all_off(board: &Switchboard, poll_interval: Duration) {
    let mut interval = tokio::time::interval(poll_interval);
    loop {
        interval.tick().await;
        if !board.any_on().await {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;
    use crate::commands::testing::{ClosedPipe, SleepLauncher};
    use wormhole_tunnel::AuthMethod;

    fn config() -> WormholeConfig {
        let mut config = WormholeConfig {
            subdomain: Some("myhouse".into()),
            auth: AuthMethod::token("relay-secret"),
            ..WormholeConfig::default()
        };
        config.jupyter.enabled = false;
        config
    }

    #[tokio::test]
    async fn up_turns_on_then_off_at_shutdown() {
        let cmd = UpCommand::new(config()).with_launcher(SleepLauncher::new());
        let mut out = Vec::new();

        cmd.execute_until(
            &mut out,
            &OutputFormat::default(),
            &UpArgs::default(),
            tokio::time::sleep(Duration::from_millis(200)),
        )
        .await
        .expect("up");

        let out = String::from_utf8(out).expect("utf8");
        assert!(out.contains("public-access"));
        assert!(out.contains("https://myhouse.wormhole.eliteu.cn"));
        assert!(out.trim_end().ends_with("All switches off"));
    }

    #[tokio::test]
    async fn up_returns_when_every_switch_exits() {
        let mut config = config();
        config.inlets_bin = "true".into();
        let cmd = UpCommand::new(config).with_poll_interval(Duration::from_millis(20));
        let mut out = Vec::new();

        cmd.execute_until(
            &mut out,
            &OutputFormat::new(Format::Json),
            &UpArgs::default(),
            std::future::pending(),
        )
        .await
        .expect("up");
    }

    #[tokio::test]
    async fn up_rejects_unknown_switch() {
        let cmd = UpCommand::new(config()).with_launcher(SleepLauncher::new());
        let args = UpArgs {
            only: vec!["remote-debug".into()],
        };
        let err = cmd
            .execute_until(
                &mut Vec::new(),
                &OutputFormat::default(),
                &args,
                std::future::ready(()),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CliError::Tunnel(TunnelError::UnknownSwitch { .. })
        ));
    }

    #[tokio::test]
    async fn up_fails_when_nothing_starts() {
        let mut config = config();
        config.inlets_bin = "/nonexistent/wormhole-test/inlets".into();
        let cmd = UpCommand::new(config);

        let err = cmd
            .execute_until(
                &mut Vec::new(),
                &OutputFormat::default(),
                &UpArgs::default(),
                std::future::pending(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CliError::Tunnel(TunnelError::LaunchFailed { .. })
        ));
    }

    #[tokio::test]
    async fn up_turns_switches_off_when_output_closes() {
        let launcher = SleepLauncher::new();
        let cmd = UpCommand::new(config()).with_launcher(launcher.clone());

        let err = cmd
            .execute_until(
                &mut ClosedPipe,
                &OutputFormat::default(),
                &UpArgs::default(),
                std::future::pending(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CliError::Io(_)));
        assert_eq!(launcher.live(), 0);
    }
}
