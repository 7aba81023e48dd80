//! The set of switches exposed on this machine.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::resolve_auth_token;
use crate::config::WormholeConfig;
use crate::controller::{Transition, TunnelController, TunnelStatus};
use crate::discovery::TokenDiscovery;
use crate::error::{Result, TunnelError};
use crate::jupyter::JupyterTunnelController;
use crate::launcher::{BoxFuture, ProcessLauncher};
use crate::subdomain::resolve_subdomain;

/// A named on/off switch.
pub trait Switch: Send + Sync {
    /// Switch name.
    fn name(&self) -> &str;

    /// Turn the switch on.
    fn turn_on(&self) -> BoxFuture<'_, Result<Transition>>;

    /// Turn the switch off.
    fn turn_off(&self) -> BoxFuture<'_, Result<Transition>>;

    /// Whether the switch is on.
    fn is_on(&self) -> BoxFuture<'_, bool>;

    /// Current status and published attributes.
    fn status(&self) -> BoxFuture<'_, TunnelStatus>;
}

impl Switch for TunnelController {
    fn name(&self) -> &str {
        TunnelController::name(self)
    }

    fn turn_on(&self) -> BoxFuture<'_, Result<Transition>> {
        Box::pin(TunnelController::turn_on(self))
    }

    fn turn_off(&self) -> BoxFuture<'_, Result<Transition>> {
        Box::pin(TunnelController::turn_off(self))
    }

    fn is_on(&self) -> BoxFuture<'_, bool> {
        Box::pin(TunnelController::is_on(self))
    }

    fn status(&self) -> BoxFuture<'_, TunnelStatus> {
        Box::pin(TunnelController::status(self))
    }
}

impl Switch for JupyterTunnelController {
    fn name(&self) -> &str {
        JupyterTunnelController::name(self)
    }

    fn turn_on(&self) -> BoxFuture<'_, Result<Transition>> {
        Box::pin(JupyterTunnelController::turn_on(self))
    }

    fn turn_off(&self) -> BoxFuture<'_, Result<Transition>> {
        Box::pin(JupyterTunnelController::turn_off(self))
    }

    fn is_on(&self) -> BoxFuture<'_, bool> {
        Box::pin(JupyterTunnelController::is_on(self))
    }

    fn status(&self) -> BoxFuture<'_, TunnelStatus> {
        Box::pin(JupyterTunnelController::status(self))
    }
}

/// All enabled switches, in configuration order.
#[derive(Clone, Default)]
pub struct Switchboard {
    switches: Vec<Arc<dyn Switch>>,
}

impl Switchboard {
    /// A switchboard over the given switches.
    #[must_use]
    pub fn new(switches: Vec<Arc<dyn Switch>>) -> Self {
        Self { switches }
    }

    /// Build the enabled switches from configuration.
    ///
    /// Resolves the subdomain and the relay token once; both switches share
    /// them.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the config is invalid, the token
    /// cannot be resolved or no subdomain can be derived.
    pub async fn from_config(
        config: &WormholeConfig,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Result<Self> {
        config.validate()?;

        let subdomain = resolve_subdomain(config.subdomain.as_deref())?;
        let token = resolve_auth_token(&config.auth).await?;
        debug!(%subdomain, auth = %config.auth.describe(), "resolved tunnel identity");

        let mut switches: Vec<Arc<dyn Switch>> = Vec::new();

        if config.tunnel.enabled {
            let tunnel = config.tunnel_config(&subdomain, token.clone())?;
            switches.push(Arc::new(TunnelController::new(tunnel, Arc::clone(&launcher))));
        }

        if config.jupyter.enabled {
            let tunnel = config.jupyter_tunnel_config(&subdomain, token)?;
            let discovery = TokenDiscovery::from_config(&config.jupyter)?;
            let controller = JupyterTunnelController::new(tunnel, discovery, launcher)
                .with_notebook(config.jupyter.notebook_spec()?);
            switches.push(Arc::new(controller));
        }

        info!(%subdomain, switches = switches.len(), "switchboard ready");
        Ok(Self { switches })
    }

    /// Look up a switch by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Switch>> {
        self.switches
            .iter()
            .find(|switch| switch.name() == name)
            .cloned()
    }

    /// Switch names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.switches.iter().map(|s| s.name().to_string()).collect()
    }

    /// All switches.
    #[must_use]
    pub fn switches(&self) -> &[Arc<dyn Switch>] {
        &self.switches
    }

    /// Whether there are no switches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }

    /// Status of every switch.
    pub async fn statuses(&self) -> Vec<TunnelStatus> {
        let mut statuses = Vec::with_capacity(self.switches.len());
        for switch in &self.switches {
            statuses.push(switch.status().await);
        }
        statuses
    }

    /// Whether any switch is on.
    pub async fn any_on(&self) -> bool {
        for switch in &self.switches {
            if switch.is_on().await {
                return true;
            }
        }
        false
    }

    /// Turn on the named switch.
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::UnknownSwitch` if there is no such switch, or the
    /// switch's own error.
    pub async fn turn_on(&self, name: &str) -> Result<Transition> {
        self.require(name)?.turn_on().await
    }

    /// Turn off the named switch.
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::UnknownSwitch` if there is no such switch, or the
    /// switch's own error.
    pub async fn turn_off(&self, name: &str) -> Result<Transition> {
        self.require(name)?.turn_off().await
    }

    /// Turn every switch off, continuing past failures.
    ///
    /// Returns the failures as `(name, error)` pairs.
    pub async fn shutdown(&self) -> Vec<(String, TunnelError)> {
        let mut failures = Vec::new();
        for switch in &self.switches {
            if let Err(e) = switch.turn_off().await {
                warn!(switch = %switch.name(), error = %e, "failed to turn off switch");
                failures.push((switch.name().to_string(), e));
            }
        }
        failures
    }

    fn require(&self, name: &str) -> Result<Arc<dyn Switch>> {
        self.get(name).ok_or_else(|| TunnelError::unknown_switch(name))
    }
}
