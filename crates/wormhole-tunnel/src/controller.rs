//! The tunnel switch.
//!
//! A [`TunnelController`] owns at most one tunnel client process. Turning it
//! on spawns the client and publishes the public URL; turning it off stops
//! the client and clears the URL. "On" means the process was launched, not
//! that the relay is reachable.
//!
//! If the client dies on its own the switch goes Off by itself: the
//! supervisor publishes the exit and a watcher task clears the state.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{AlreadyOnPolicy, TunnelConfig};
use crate::error::{Result, TunnelError};
use crate::launcher::{ExitReport, ProcessLauncher};
use crate::supervisor::Supervised;

/// What a `turn_on` / `turn_off` call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// A process was started.
    Started,
    /// A process was stopped.
    Stopped,
    /// The switch was already in the requested state.
    Unchanged,
}

/// Snapshot of a switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TunnelStatus {
    /// Switch name.
    pub name: String,
    /// Whether the switch owns a live process.
    pub is_on: bool,
    /// Tunnel client process id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Published public URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    /// Published notebook token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// How the last process ended, if it exited on its own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_exit: Option<ExitReport>,
}

impl TunnelStatus {
    /// An Off status.
    #[must_use]
    pub fn off(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_on: false,
            pid: None,
            public_url: None,
            token: None,
            last_exit: None,
        }
    }

    /// The published attributes: `url`, plus `token` for the notebook switch.
    #[must_use]
    pub fn attributes(&self) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::new();
        if let Some(url) = &self.public_url {
            attributes.insert("url".to_string(), url.clone());
        }
        if let Some(token) = &self.token {
            attributes.insert("token".to_string(), token.clone());
        }
        attributes
    }
}

struct ActiveTunnel {
    generation: u64,
    process: Supervised,
}

#[derive(Default)]
struct ControllerState {
    active: Option<ActiveTunnel>,
    generation: u64,
    last_exit: Option<ExitReport>,
}

impl ControllerState {
    /// Drop a process that already exited but whose watcher has not run yet.
    async fn reap_exited(&mut self) {
        let exited = self
            .active
            .as_ref()
            .and_then(|active| active.process.exited());

        if let Some(report) = exited {
            if let Some(active) = self.active.take() {
                let _ = active.process.stop().await;
            }
            self.last_exit = Some(report);
        }
    }
}

/// Manages one tunnel client process.
pub struct TunnelController {
    config: TunnelConfig,
    launcher: Arc<dyn ProcessLauncher>,
    state: Arc<Mutex<ControllerState>>,
}

impl TunnelController {
    /// Creates a controller in the Off state.
    pub fn new(config: TunnelConfig, launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            config,
            launcher,
            state: Arc::new(Mutex::new(ControllerState::default())),
        }
    }

    /// Switch name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The tunnel parameters.
    #[must_use]
    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// Launch the tunnel client.
    ///
    /// Returns once the process is spawned; connectivity is not verified.
    ///
    /// # Errors
    ///
    /// - `TunnelError::LaunchFailed` if the client cannot start (state stays Off)
    /// - `TunnelError::AlreadyRunning` if already on and the policy is `reject`
    pub async fn turn_on(&self) -> Result<Transition> {
        let mut state = self.state.lock().await;
        state.reap_exited().await;

        if let Some(active) = &state.active {
            return match self.config.already_on {
                AlreadyOnPolicy::Ignore => Ok(Transition::Unchanged),
                AlreadyOnPolicy::Reject => Err(TunnelError::already_running(
                    self.name(),
                    active.process.pid().unwrap_or_default(),
                )),
            };
        }

        let spec = self.config.launch_spec();
        let child = self.launcher.spawn(&spec).await.inspect_err(|e| {
            warn!(switch = %self.name(), command = %spec, error = %e, "failed to start tunnel");
        })?;

        state.generation += 1;
        let generation = state.generation;
        let process = Supervised::start(self.name().to_string(), child, self.config.stop_grace);

        info!(
            switch = %self.name(),
            pid = process.pid(),
            url = %self.config.public_url,
            command = %spec,
            "tunnel started"
        );

        self.watch_exit(&process, generation);
        state.last_exit = None;
        state.active = Some(ActiveTunnel {
            generation,
            process,
        });

        Ok(Transition::Started)
    }

    /// Stop the tunnel client. A no-op when already off.
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::TerminateFailed` if the supervisor task failed.
    /// The switch is Off either way.
    pub async fn turn_off(&self) -> Result<Transition> {
        let mut state = self.state.lock().await;
        state.reap_exited().await;

        let Some(active) = state.active.take() else {
            return Ok(Transition::Unchanged);
        };

        let report = active
            .process
            .stop()
            .await
            .map_err(|reason| TunnelError::terminate_failed(self.name(), reason))?;

        info!(switch = %self.name(), %report, "tunnel stopped");
        Ok(Transition::Stopped)
    }

    /// Whether a live tunnel client is owned.
    pub async fn is_on(&self) -> bool {
        let state = self.state.lock().await;
        state
            .active
            .as_ref()
            .is_some_and(|active| active.process.exited().is_none())
    }

    /// Current status.
    pub async fn status(&self) -> TunnelStatus {
        let state = self.state.lock().await;

        match &state.active {
            Some(active) => match active.process.exited() {
                None => TunnelStatus {
                    name: self.name().to_string(),
                    is_on: true,
                    pid: active.process.pid(),
                    public_url: Some(self.config.public_url.clone()),
                    token: None,
                    last_exit: None,
                },
                Some(report) => TunnelStatus {
                    last_exit: Some(report),
                    ..TunnelStatus::off(self.name())
                },
            },
            None => TunnelStatus {
                last_exit: state.last_exit,
                ..TunnelStatus::off(self.name())
            },
        }
    }

    /// Move the switch to Off when this generation's process exits unasked.
    fn watch_exit(&self, process: &Supervised, generation: u64) {
        let mut exit_rx = process.exit_receiver();
        let state = Arc::clone(&self.state);
        let name = self.name().to_string();

        tokio::spawn(async move {
            let report = exit_rx
                .wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|report| *report);

            let mut state = state.lock().await;
            let current = state
                .active
                .as_ref()
                .is_some_and(|active| active.generation == generation);
            if !current {
                // Stopped by turn_off, or already replaced.
                return;
            }

            if let Some(active) = state.active.take() {
                let _ = active.process.stop().await;
            }
            state.last_exit = report;
            warn!(
                switch = %name,
                exit = %report.unwrap_or_default(),
                "tunnel client exited unexpectedly, switch is now off"
            );
        });
    }
}
