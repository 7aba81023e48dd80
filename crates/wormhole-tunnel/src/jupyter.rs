//! The notebook tunnel switch.
//!
//! Same lifecycle as [`TunnelController`], pointed at the debug host. After
//! the tunnel is launched the switch looks up the running notebook server's
//! token, because the remote side needs both URL and token to log in. The
//! URL and token are published together, or not at all.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::TunnelConfig;
use crate::controller::{Transition, TunnelController, TunnelStatus};
use crate::discovery::TokenDiscovery;
use crate::error::{Result, TunnelError};
use crate::launcher::{LaunchSpec, ProcessLauncher};
use crate::supervisor::Supervised;

#[derive(Default)]
struct JupyterState {
    token: Option<String>,
    notebook: Option<Supervised>,
}

/// Tunnel to the notebook server plus token discovery.
pub struct JupyterTunnelController {
    tunnel: TunnelController,
    discovery: TokenDiscovery,
    notebook: Option<LaunchSpec>,
    launcher: Arc<dyn ProcessLauncher>,
    stop_grace: Duration,
    state: Mutex<JupyterState>,
}

impl JupyterTunnelController {
    /// Creates the switch in the Off state.
    pub fn new(
        config: TunnelConfig,
        discovery: TokenDiscovery,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let stop_grace = config.stop_grace;
        Self {
            tunnel: TunnelController::new(config, Arc::clone(&launcher)),
            discovery,
            notebook: None,
            launcher,
            stop_grace,
            state: Mutex::new(JupyterState::default()),
        }
    }

    /// Also start the notebook server with this command on `turn_on`.
    #[must_use]
    pub fn with_notebook(mut self, command: Option<LaunchSpec>) -> Self {
        self.notebook = command;
        self
    }

    /// Switch name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.tunnel.name()
    }

    /// The tunnel parameters.
    #[must_use]
    pub fn config(&self) -> &TunnelConfig {
        self.tunnel.config()
    }

    /// Start the notebook server (if configured), the tunnel, then discover
    /// the token.
    ///
    /// Discovery failure is not an error: the switch is on, it just publishes
    /// no attributes. Turning on a switch that is on but has no token yet
    /// retries discovery.
    ///
    /// # Errors
    ///
    /// - `TunnelError::LaunchFailed` if the notebook server or tunnel cannot start
    /// - `TunnelError::AlreadyRunning` if already on and the policy is `reject`
    pub async fn turn_on(&self) -> Result<Transition> {
        let mut state = self.state.lock().await;

        let started_notebook = self.ensure_notebook(&mut state).await?;

        let transition = match self.tunnel.turn_on().await {
            Ok(transition) => transition,
            Err(e) => {
                if started_notebook {
                    if let Some(notebook) = state.notebook.take() {
                        let _ = notebook.stop().await;
                    }
                }
                return Err(e);
            }
        };

        if transition == Transition::Started {
            state.token = None;
        }

        if state.token.is_none() {
            match self.discovery.discover(self.launcher.as_ref()).await {
                Ok(token) => {
                    info!(
                        switch = %self.name(),
                        url = %self.config().public_url,
                        "notebook reachable from the internet"
                    );
                    state.token = Some(token);
                }
                Err(e) => {
                    warn!(
                        switch = %self.name(),
                        error = %e,
                        "notebook token unavailable, publishing no attributes"
                    );
                }
            }
        }

        Ok(transition)
    }

    /// Stop the tunnel and the notebook server, clearing URL and token.
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::TerminateFailed` if a supervisor task failed.
    pub async fn turn_off(&self) -> Result<Transition> {
        let mut state = self.state.lock().await;
        state.token = None;

        let transition = self.tunnel.turn_off().await;

        if let Some(notebook) = state.notebook.take() {
            let report = notebook
                .stop()
                .await
                .map_err(|reason| TunnelError::terminate_failed(self.name(), reason))?;
            info!(switch = %self.name(), %report, "notebook server stopped");
        }

        transition
    }

    /// Whether the tunnel client is live.
    pub async fn is_on(&self) -> bool {
        self.tunnel.is_on().await
    }

    /// Current status. URL and token appear only together.
    pub async fn status(&self) -> TunnelStatus {
        let state = self.state.lock().await;
        let mut status = self.tunnel.status().await;

        match (&state.token, status.is_on) {
            (Some(token), true) => status.token = Some(token.clone()),
            _ => status.public_url = None,
        }
        status
    }

    /// Returns `true` if a notebook server was started by this call.
    async fn ensure_notebook(&self, state: &mut JupyterState) -> Result<bool> {
        let Some(spec) = &self.notebook else {
            return Ok(false);
        };

        if state
            .notebook
            .as_ref()
            .is_some_and(|notebook| notebook.exited().is_none())
        {
            return Ok(false);
        }

        if let Some(previous) = state.notebook.take() {
            let _ = previous.stop().await;
        }

        let child = self.launcher.spawn(spec).await?;
        let notebook =
            Supervised::start(format!("{}-notebook", self.name()), child, self.stop_grace);
        info!(
            switch = %self.name(),
            pid = ?notebook.pid(),
            command = %spec,
            "notebook server started"
        );
        state.notebook = Some(notebook);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthToken;
    use crate::config::WormholeConfig;
    use crate::launcher::mock::MockLauncher;
    use wormhole_validation::command::AllowedProgram;

    const LISTING: &str =
        "Currently running servers:\nhttp://0.0.0.0:8889/?token=abc123 :: /home/jovyan\n";

    fn switch(launcher: &Arc<MockLauncher>) -> JupyterTunnelController {
        let config = WormholeConfig::default();
        let tunnel = config
            .jupyter_tunnel_config("myhouse", AuthToken::new("relay-secret").expect("token"))
            .expect("derive");
        let discovery = TokenDiscovery::from_config(&config.jupyter)
            .expect("discovery")
            .with_timeout(Duration::from_secs(1))
            .with_backoff(Duration::from_millis(100));

        let launcher: Arc<dyn ProcessLauncher> = Arc::clone(launcher) as Arc<dyn ProcessLauncher>;
        JupyterTunnelController::new(tunnel, discovery, launcher)
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_url_and_token() {
        let launcher = MockLauncher::new();
        launcher.push_output(LISTING, "");
        let ctl = switch(&launcher);

        assert_eq!(ctl.turn_on().await.expect("turn on"), Transition::Started);

        let spawned = launcher.spawned();
        assert_eq!(spawned.len(), 1);
        assert!(spawned[0].args.contains(
            &"--upstream=myhouse_debug.wormhole.eliteu.cn=http://0.0.0.0:8889".to_string()
        ));

        let status = ctl.status().await;
        assert!(status.is_on);
        assert_eq!(status.token.as_deref(), Some("abc123"));
        let attributes = status.attributes();
        assert_eq!(
            attributes.get("url").map(String::as_str),
            Some("https://myhouse_debug.wormhole.eliteu.cn")
        );
        assert_eq!(attributes.get("token").map(String::as_str), Some("abc123"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_token_publishes_nothing_but_stays_on() {
        let launcher = MockLauncher::new();
        let ctl = switch(&launcher);

        ctl.turn_on().await.expect("discovery failure is not an error");
        assert!(ctl.is_on().await);

        let status = ctl.status().await;
        assert!(status.is_on);
        assert!(status.attributes().is_empty());
        assert!(launcher.run_count() > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_on_again_retries_discovery() {
        let launcher = MockLauncher::new();
        launcher.push_run_failure("jupyter: command not found");
        let ctl = switch(&launcher);

        ctl.turn_on().await.expect("turn on");
        assert!(ctl.status().await.token.is_none());

        launcher.push_output(LISTING, "");
        assert_eq!(ctl.turn_on().await.expect("again"), Transition::Unchanged);
        assert_eq!(ctl.status().await.token.as_deref(), Some("abc123"));
        assert_eq!(launcher.spawn_count(), 1);

        // Once the token is known, repeated turn_on does not rerun discovery.
        let runs = launcher.run_count();
        ctl.turn_on().await.expect("again");
        assert_eq!(launcher.run_count(), runs);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_off_clears_token_and_url() {
        let launcher = MockLauncher::new();
        launcher.push_output(LISTING, "");
        let ctl = switch(&launcher);

        ctl.turn_on().await.expect("turn on");
        assert_eq!(ctl.turn_off().await.expect("turn off"), Transition::Stopped);

        let status = ctl.status().await;
        assert!(!status.is_on);
        assert!(status.token.is_none());
        assert!(status.public_url.is_none());
        assert_eq!(launcher.live_count(), 0);

        assert_eq!(ctl.turn_off().await.expect("noop"), Transition::Unchanged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crash_hides_token() {
        let launcher = MockLauncher::new();
        launcher.push_output(LISTING, "");
        let ctl = switch(&launcher);

        ctl.turn_on().await.expect("turn on");
        launcher.crash(0, 1);
        for _ in 0..100 {
            if !ctl.is_on().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let status = ctl.status().await;
        assert!(!status.is_on);
        assert!(status.attributes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawns_and_stops_notebook_server() {
        let launcher = MockLauncher::new();
        launcher.push_output(LISTING, "");
        let notebook = LaunchSpec::new(AllowedProgram::Jupyter).args(["notebook", "--ip", "0.0.0.0"]);
        let ctl = switch(&launcher).with_notebook(Some(notebook));

        ctl.turn_on().await.expect("turn on");
        let spawned = launcher.spawned();
        assert_eq!(spawned.len(), 2);
        assert_eq!(spawned[0].program, AllowedProgram::Jupyter);
        assert_eq!(spawned[1].program, AllowedProgram::Inlets);
        assert_eq!(launcher.live_count(), 2);

        ctl.turn_off().await.expect("turn off");
        assert_eq!(launcher.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tunnel_failure_keeps_earlier_notebook() {
        let launcher = MockLauncher::new();
        let notebook = LaunchSpec::new(AllowedProgram::Jupyter).args(["notebook"]);
        let ctl = switch(&launcher).with_notebook(Some(notebook));

        {
            let mut state = ctl.state.lock().await;
            assert!(ctl.ensure_notebook(&mut state).await.expect("notebook"));
            assert!(!ctl.ensure_notebook(&mut state).await.expect("still live"));
        }
        launcher.fail_spawns(true);

        let err = ctl.turn_on().await.unwrap_err();
        assert!(matches!(err, TunnelError::LaunchFailed { .. }));
        assert!(!ctl.is_on().await);
        assert_eq!(launcher.live_count(), 1);

        ctl.turn_off().await.expect("turn off");
        assert_eq!(launcher.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notebook_launch_failure() {
        let launcher = MockLauncher::new();
        launcher.fail_spawns(true);
        let notebook = LaunchSpec::new(AllowedProgram::Jupyter).args(["notebook"]);
        let ctl = switch(&launcher).with_notebook(Some(notebook));

        let err = ctl.turn_on().await.unwrap_err();
        assert!(matches!(err, TunnelError::LaunchFailed { ref program, .. } if program == "jupyter"));
        assert!(!ctl.is_on().await);
        assert_eq!(launcher.run_count(), 0);
    }
}
