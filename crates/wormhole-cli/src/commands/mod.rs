//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`up`] - Turn switches on until interrupted
//! - [`serve`] - Line-oriented switch control on stdin
//! - [`subdomain`] - Show the tunnel identity of this machine
//! - [`show_command`] - Show a switch's tunnel client command
//! - [`token`] - One-shot notebook token discovery
//! - [`init_config`] - Write the sample configuration

pub mod init_config;
pub mod serve;
pub mod show_command;
pub mod subdomain;
pub mod token;
pub mod up;

pub use init_config::InitConfigCommand;
pub use serve::ServeCommand;
pub use show_command::ShowCommand;
pub use subdomain::SubdomainCommand;
pub use token::TokenCommand;
pub use up::UpCommand;

use std::path::Path;

use tracing::{debug, info};
use wormhole_tunnel::WormholeConfig;

use crate::error::CliError;

/// Load the configuration file, or the built-in defaults when no path is given.
///
/// # Errors
///
/// Returns `CliError::Config` if the file cannot be read or is invalid.
pub fn load_config(path: Option<&Path>) -> Result<WormholeConfig, CliError> {
    let config = match path {
        Some(path) => {
            debug!(path = %path.display(), "loading configuration");
            WormholeConfig::from_file(path)
        }
        None => {
            debug!("no configuration file, using defaults");
            WormholeConfig::from_toml("")
        }
    };
    config.map_err(|e| CliError::Config(e.to_string()))
}

/// Resolves when the process receives Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl-C, turning switches off"),
        () = terminate => info!("received SIGTERM, turning switches off"),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Launchers and writers for command tests.

    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use wormhole_tunnel::launcher::{
        AllowedProgram, BoxFuture, CommandOutput, ExitReport, ManagedChild,
    };
    use wormhole_tunnel::{LaunchSpec, ProcessLauncher, SystemLauncher};

    /// Runs `sleep 30` in place of every tunnel client and counts the ones
    /// still owned by a switch.
    pub(crate) struct SleepLauncher {
        stand_in: LaunchSpec,
        system: SystemLauncher,
        live: Arc<AtomicUsize>,
    }

    impl SleepLauncher {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                stand_in: LaunchSpec::new(AllowedProgram::Inlets)
                    .with_program_path("sleep")
                    .args(["30"]),
                system: SystemLauncher::new(),
                live: Arc::new(AtomicUsize::new(0)),
            })
        }

        /// Children spawned and not yet released by their supervisor.
        pub(crate) fn live(&self) -> usize {
            self.live.load(Ordering::SeqCst)
        }
    }

    impl ProcessLauncher for SleepLauncher {
        fn spawn<'a>(
            &'a self,
            _spec: &'a LaunchSpec,
        ) -> BoxFuture<'a, wormhole_tunnel::Result<Box<dyn ManagedChild>>> {
            Box::pin(async move {
                let inner = self.system.spawn(&self.stand_in).await?;
                self.live.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(Counted {
                    inner,
                    live: Arc::clone(&self.live),
                }) as Box<dyn ManagedChild>)
            })
        }

        fn run<'a>(
            &'a self,
            spec: &'a LaunchSpec,
        ) -> BoxFuture<'a, wormhole_tunnel::Result<CommandOutput>> {
            self.system.run(spec)
        }
    }

    struct Counted {
        inner: Box<dyn ManagedChild>,
        live: Arc<AtomicUsize>,
    }

    impl ManagedChild for Counted {
        fn id(&self) -> Option<u32> {
            self.inner.id()
        }

        fn wait(&mut self) -> BoxFuture<'_, io::Result<ExitReport>> {
            self.inner.wait()
        }

        fn terminate(&mut self) -> io::Result<()> {
            self.inner.terminate()
        }

        fn kill(&mut self) -> BoxFuture<'_, io::Result<()>> {
            self.inner.kill()
        }
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// An output whose reader has gone away.
    pub(crate) struct ClosedPipe;

    impl io::Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }
}
