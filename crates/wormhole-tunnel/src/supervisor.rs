//! Ownership of one running child process.
//!
//! A supervisor task owns the child and waits for either its natural exit or
//! a stop request. Stopping sends SIGTERM, waits for the grace period, then
//! kills. The final [`ExitReport`] is published on a `watch` channel so
//! observers learn about a crash without polling the process.

use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::launcher::{ExitReport, ManagedChild};

/// A supervised child process.
pub(crate) struct Supervised {
    pid: Option<u32>,
    stop_tx: Option<oneshot::Sender<()>>,
    exit_rx: watch::Receiver<Option<ExitReport>>,
    handle: JoinHandle<ExitReport>,
}

impl Supervised {
    /// Hands `child` to a new supervisor task.
    pub(crate) fn start(name: String, mut child: Box<dyn ManagedChild>, grace: Duration) -> Self {
        let pid = child.id();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let (exit_tx, exit_rx) = watch::channel(None);

        let handle = tokio::spawn(async move {
            // A dropped sender also means stop: nobody owns the switch anymore.
            let exited = tokio::select! {
                result = child.wait() => Some(result),
                _ = &mut stop_rx => None,
            };

            let report = match exited {
                Some(Ok(report)) => report,
                Some(Err(e)) => {
                    warn!(process = %name, error = %e, "failed to wait for process");
                    ExitReport::default()
                }
                None => stop_child(&name, child.as_mut(), grace).await,
            };

            exit_tx.send_replace(Some(report));
            report
        });

        Self {
            pid,
            stop_tx: Some(stop_tx),
            exit_rx,
            handle,
        }
    }

    /// Process id at launch.
    pub(crate) fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The exit report, once the process has ended.
    pub(crate) fn exited(&self) -> Option<ExitReport> {
        *self.exit_rx.borrow()
    }

    /// A receiver that sees the exit report when it is published.
    pub(crate) fn exit_receiver(&self) -> watch::Receiver<Option<ExitReport>> {
        self.exit_rx.clone()
    }

    /// Stops the process (if still running) and waits for the supervisor.
    ///
    /// Returns `Err` with the join failure if the supervisor task panicked.
    pub(crate) async fn stop(mut self) -> Result<ExitReport, String> {
        if let Some(stop_tx) = self.stop_tx.take() {
            // Fails only if the process already exited on its own.
            let _ = stop_tx.send(());
        }
        self.handle.await.map_err(|e| e.to_string())
    }
}

async fn stop_child(name: &str, child: &mut dyn ManagedChild, grace: Duration) -> ExitReport {
    if let Err(e) = child.terminate() {
        warn!(process = %name, error = %e, "failed to send SIGTERM");
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(report)) => {
            debug!(process = %name, %report, "process stopped");
            report
        }
        Ok(Err(e)) => {
            warn!(process = %name, error = %e, "failed to wait for process");
            ExitReport::default()
        }
        Err(_) => {
            warn!(
                process = %name,
                grace_ms = grace.as_millis() as u64,
                "process ignored SIGTERM, killing"
            );
            if let Err(e) = child.kill().await {
                warn!(process = %name, error = %e, "failed to kill process");
            }
            child.wait().await.unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::mock::MockLauncher;
    use crate::launcher::{LaunchSpec, ProcessLauncher};
    use wormhole_validation::command::AllowedProgram;

    async fn spawn_mock(launcher: &MockLauncher) -> Box<dyn ManagedChild> {
        launcher
            .spawn(&LaunchSpec::new(AllowedProgram::Inlets))
            .await
            .expect("mock spawn")
    }

    #[tokio::test]
    async fn test_stop_sends_terminate() {
        let launcher = MockLauncher::new();
        let supervised = Supervised::start(
            "tunnel".into(),
            spawn_mock(&launcher).await,
            Duration::from_secs(5),
        );
        assert_eq!(supervised.pid(), Some(1000));
        assert!(supervised.exited().is_none());

        let report = supervised.stop().await.expect("supervisor");
        assert_eq!(report, ExitReport::signaled(15));
        assert_eq!(launcher.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_escalates_to_kill() {
        let launcher = MockLauncher::new();
        launcher.ignore_terminate(true);
        let supervised = Supervised::start(
            "stubborn".into(),
            spawn_mock(&launcher).await,
            Duration::from_millis(200),
        );

        let report = supervised.stop().await.expect("supervisor");
        assert_eq!(report, ExitReport::signaled(9));
    }

    #[tokio::test]
    async fn test_natural_exit_is_published() {
        let launcher = MockLauncher::new();
        let supervised = Supervised::start(
            "tunnel".into(),
            spawn_mock(&launcher).await,
            Duration::from_secs(5),
        );
        let mut exit_rx = supervised.exit_receiver();

        launcher.crash(0, 1);
        let report = exit_rx
            .wait_for(Option::is_some)
            .await
            .map(|r| *r)
            .expect("exit published");
        assert_eq!(report, Some(ExitReport::exited(1)));
        assert_eq!(supervised.exited(), Some(ExitReport::exited(1)));

        // Stopping an exited process just collects the report.
        assert_eq!(supervised.stop().await, Ok(ExitReport::exited(1)));
    }
}
