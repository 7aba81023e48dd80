//! Switch configuration.
//!
//! Loaded from a TOML file. Everything except the relay token has a default,
//! so an empty file describes the two stock switches:
//! - `public-access` exposes `http://127.0.0.1:8123`
//! - `remote-debug` exposes the notebook server at `http://0.0.0.0:8889`

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use wormhole_validation::command::{AllowedProgram, validate_program_path};
use wormhole_validation::{parse_port, sanitize_hostname, sanitize_subdomain, sanitize_url};

use crate::auth::{AuthMethod, AuthToken};
use crate::error::{Result, TunnelError};
use crate::launcher::LaunchSpec;

/// Default relay domain.
pub const DEFAULT_RELAY_HOST: &str = "wormhole.eliteu.cn";

/// Default tunnel client binary.
pub const DEFAULT_INLETS_BIN: &str = "inlets";

/// Flag carrying the relay token on the client command line.
pub const TOKEN_FLAG: &str = "--token";

/// What `turn_on` does when the switch already owns a process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlreadyOnPolicy {
    /// Succeed without starting a second process.
    #[default]
    Ignore,
    /// Fail with `TunnelError::AlreadyRunning`.
    Reject,
}

/// Process management settings shared by all switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// How long a stopping process gets between SIGTERM and SIGKILL.
    pub stop_grace_ms: u64,
    /// Behavior of `turn_on` on a switch that is already on.
    pub already_on: AlreadyOnPolicy,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            stop_grace_ms: 5_000,
            already_on: AlreadyOnPolicy::Ignore,
        }
    }
}

/// The plain tunnel switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSwitchConfig {
    /// Switch name.
    pub name: String,
    /// Whether the switch is created at all.
    pub enabled: bool,
    /// Host of the local service.
    pub local_host: String,
    /// Port of the local service, as text.
    #[serde(deserialize_with = "port_text")]
    pub local_port: String,
}

impl Default for TunnelSwitchConfig {
    fn default() -> Self {
        Self {
            name: "public-access".to_string(),
            enabled: true,
            local_host: "127.0.0.1".to_string(),
            local_port: "8123".to_string(),
        }
    }
}

/// The notebook tunnel switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JupyterSwitchConfig {
    /// Switch name.
    pub name: String,
    /// Whether the switch is created at all.
    pub enabled: bool,
    /// Host the notebook server listens on.
    pub local_host: String,
    /// Notebook server port, as text.
    #[serde(deserialize_with = "port_text")]
    pub local_port: String,
    /// Appended to the subdomain to form the debug host label.
    pub host_suffix: String,
    /// Command listing running notebook servers.
    pub discovery_command: Vec<String>,
    /// Overall bound on token discovery.
    pub discovery_timeout_ms: u64,
    /// First retry delay; doubles after each empty attempt.
    pub discovery_retry_ms: u64,
    /// Also start the notebook server when the switch turns on.
    pub spawn_notebook: bool,
    /// Command starting the notebook server.
    pub notebook_command: Vec<String>,
}

impl Default for JupyterSwitchConfig {
    fn default() -> Self {
        Self {
            name: "remote-debug".to_string(),
            enabled: true,
            local_host: "0.0.0.0".to_string(),
            local_port: "8889".to_string(),
            host_suffix: "_debug".to_string(),
            discovery_command: to_strings(&["jupyter", "notebook", "list"]),
            discovery_timeout_ms: 10_000,
            discovery_retry_ms: 250,
            spawn_notebook: false,
            notebook_command: to_strings(&["jupyter", "notebook", "--ip", "0.0.0.0"]),
        }
    }
}

impl JupyterSwitchConfig {
    /// The discovery command as a launch spec.
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::InvalidConfig` if the command is empty.
    pub fn discovery_spec(&self) -> Result<LaunchSpec> {
        command_spec("jupyter.discovery_command", &self.discovery_command)
    }

    /// The notebook server command, if the switch should start one.
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::InvalidConfig` if the command is empty.
    pub fn notebook_spec(&self) -> Result<Option<LaunchSpec>> {
        if !self.spawn_notebook {
            return Ok(None);
        }
        command_spec("jupyter.notebook_command", &self.notebook_command).map(Some)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WormholeConfig {
    /// Relay domain; public hosts are `<label>.<relay_host>`.
    pub relay_host: String,
    /// Path to the tunnel client binary.
    pub inlets_bin: String,
    /// Fixed subdomain. Derived from the machine when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    /// Where the relay token comes from.
    pub auth: AuthMethod,
    /// The plain tunnel switch.
    pub tunnel: TunnelSwitchConfig,
    /// The notebook tunnel switch.
    pub jupyter: JupyterSwitchConfig,
    /// Process management.
    pub process: ProcessConfig,
}

impl Default for WormholeConfig {
    fn default() -> Self {
        Self {
            relay_host: DEFAULT_RELAY_HOST.to_string(),
            inlets_bin: DEFAULT_INLETS_BIN.to_string(),
            subdomain: None,
            auth: AuthMethod::default(),
            tunnel: TunnelSwitchConfig::default(),
            jupyter: JupyterSwitchConfig::default(),
            process: ProcessConfig::default(),
        }
    }
}

const SAMPLE_CONFIG: &str = r#"# wormhole switch configuration

# Relay domain. Public hosts are <subdomain>.<relay_host>.
relay_host = "wormhole.eliteu.cn"

# Tunnel client binary.
inlets_bin = "inlets"

# Fixed subdomain. When unset, it is derived from this machine's
# hardware address.
# subdomain = "myhouse"

# Relay token source: "token_env", "token_file" or "token".
[auth]
type = "token_env"
var_name = "INLETS_TOKEN"

[tunnel]
name = "public-access"
enabled = true
local_host = "127.0.0.1"
local_port = "8123"

[jupyter]
name = "remote-debug"
enabled = true
local_host = "0.0.0.0"
local_port = "8889"
host_suffix = "_debug"
discovery_command = ["jupyter", "notebook", "list"]
discovery_timeout_ms = 10000
discovery_retry_ms = 250
# Start the notebook server together with the tunnel.
spawn_notebook = false
notebook_command = ["jupyter", "notebook", "--ip", "0.0.0.0"]

[process]
stop_grace_ms = 5000
# "ignore" or "reject" when turning on a switch that is already on.
already_on = "ignore"
"#;

impl WormholeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            TunnelError::invalid_config(format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| TunnelError::invalid_config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// A commented sample configuration with every default spelled out.
    #[must_use]
    pub fn sample() -> &'static str {
        SAMPLE_CONFIG
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::InvalidConfig` describing the first problem.
    pub fn validate(&self) -> Result<()> {
        sanitize_hostname(&self.relay_host).map_err(config_error)?;
        validate_program_path(&self.inlets_bin).map_err(config_error)?;

        if let Some(subdomain) = &self.subdomain {
            sanitize_subdomain(subdomain).map_err(config_error)?;
        }

        if self.process.stop_grace_ms == 0 {
            return Err(TunnelError::invalid_config(
                "process.stop_grace_ms must be greater than 0",
            ));
        }

        if self.tunnel.enabled {
            let tunnel = &self.tunnel;
            validate_switch("tunnel", &tunnel.name, &tunnel.local_host, &tunnel.local_port)?;
        }

        if self.jupyter.enabled {
            let jupyter = &self.jupyter;
            validate_switch("jupyter", &jupyter.name, &jupyter.local_host, &jupyter.local_port)?;

            if !jupyter
                .host_suffix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
            {
                return Err(TunnelError::invalid_config(
                    "jupyter.host_suffix may only contain lowercase letters, digits, '-' and '_'",
                ));
            }

            jupyter.discovery_spec()?;
            jupyter.notebook_spec()?;

            if jupyter.discovery_timeout_ms == 0 {
                return Err(TunnelError::invalid_config(
                    "jupyter.discovery_timeout_ms must be greater than 0",
                ));
            }

            if jupyter.discovery_retry_ms == 0 {
                return Err(TunnelError::invalid_config(
                    "jupyter.discovery_retry_ms must be greater than 0",
                ));
            }
        }

        if self.tunnel.enabled && self.jupyter.enabled && self.tunnel.name == self.jupyter.name {
            return Err(TunnelError::invalid_config(format!(
                "switch name '{}' is used twice",
                self.tunnel.name
            )));
        }

        Ok(())
    }

    /// Time between SIGTERM and SIGKILL.
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.process.stop_grace_ms)
    }

    /// Tunnel parameters for the plain switch.
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::InvalidConfig` if the derived hosts are invalid.
    pub fn tunnel_config(&self, subdomain: &str, token: AuthToken) -> Result<TunnelConfig> {
        self.derive_tunnel(
            &self.tunnel.name,
            subdomain,
            &self.tunnel.local_host,
            &self.tunnel.local_port,
            token,
        )
    }

    /// Tunnel parameters for the notebook switch (`<subdomain><suffix>` host).
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::InvalidConfig` if the derived hosts are invalid.
    pub fn jupyter_tunnel_config(&self, subdomain: &str, token: AuthToken) -> Result<TunnelConfig> {
        self.derive_tunnel(
            &self.jupyter.name,
            &format!("{subdomain}{}", self.jupyter.host_suffix),
            &self.jupyter.local_host,
            &self.jupyter.local_port,
            token,
        )
    }

    /// Tunnel parameters for the switch with the given name.
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::UnknownSwitch` if no enabled switch has this
    /// name, or `TunnelError::InvalidConfig` if the derived hosts are invalid.
    pub fn tunnel_config_for(
        &self,
        name: &str,
        subdomain: &str,
        token: AuthToken,
    ) -> Result<TunnelConfig> {
        if self.tunnel.enabled && self.tunnel.name == name {
            self.tunnel_config(subdomain, token)
        } else if self.jupyter.enabled && self.jupyter.name == name {
            self.jupyter_tunnel_config(subdomain, token)
        } else {
            Err(TunnelError::unknown_switch(name))
        }
    }

    /// Public host for a subdomain label, e.g. `myhouse.wormhole.eliteu.cn`.
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::InvalidConfig` if the label or host is invalid.
    pub fn public_host(&self, label: &str) -> Result<String> {
        let label = sanitize_subdomain(label).map_err(config_error)?;
        Ok(sanitize_hostname(&format!("{label}.{}", self.relay_host))
            .map_err(config_error)?
            .into_inner())
    }

    /// Public host of the notebook switch for a subdomain.
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::InvalidConfig` if the label or host is invalid.
    pub fn debug_host(&self, subdomain: &str) -> Result<String> {
        self.public_host(&format!("{subdomain}{}", self.jupyter.host_suffix))
    }

    fn derive_tunnel(
        &self,
        name: &str,
        label: &str,
        local_host: &str,
        local_port: &str,
        auth_token: AuthToken,
    ) -> Result<TunnelConfig> {
        let public_host = self.public_host(label)?;
        let port = parse_port(local_port).map_err(config_error)?;
        let local_upstream = sanitize_url(&format!("http://{local_host}:{port}"))
            .map_err(config_error)?
            .into_inner();

        Ok(TunnelConfig {
            name: name.to_string(),
            remote_url: format!("wss://{public_host}"),
            public_url: format!("https://{public_host}"),
            public_host,
            local_upstream,
            binary_path: self.inlets_bin.clone(),
            auth_token,
            stop_grace: self.stop_grace(),
            already_on: self.process.already_on,
        })
    }
}

/// Everything one tunnel switch needs. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    /// Switch name.
    pub name: String,
    /// Public host, e.g. `myhouse.wormhole.eliteu.cn`.
    pub public_host: String,
    /// Relay websocket URL.
    pub remote_url: String,
    /// URL published while the switch is on.
    pub public_url: String,
    /// Local service the relay forwards to.
    pub local_upstream: String,
    /// Tunnel client binary.
    pub binary_path: String,
    /// Relay token.
    pub auth_token: AuthToken,
    /// Time between SIGTERM and SIGKILL.
    pub stop_grace: Duration,
    /// Behavior on `turn_on` while on.
    pub already_on: AlreadyOnPolicy,
}

impl TunnelConfig {
    /// Arguments for the tunnel client.
    #[must_use]
    pub fn launch_args(&self) -> Vec<String> {
        vec![
            "client".to_string(),
            "--remote".to_string(),
            self.remote_url.clone(),
            format!("--upstream={}={}", self.public_host, self.local_upstream),
            TOKEN_FLAG.to_string(),
            self.auth_token.expose().to_string(),
        ]
    }

    /// The full launch command, with the token marked secret.
    #[must_use]
    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec::new(AllowedProgram::Inlets)
            .with_program_path(self.binary_path.clone())
            .args(self.launch_args())
            .secret_flag(TOKEN_FLAG)
    }
}

fn config_error(err: wormhole_validation::ValidationError) -> TunnelError {
    TunnelError::invalid_config(err.to_string())
}

fn to_strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

fn validate_switch(section: &str, name: &str, local_host: &str, local_port: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(TunnelError::invalid_config(format!(
            "{section}.name cannot be empty"
        )));
    }

    if name.chars().any(char::is_whitespace) {
        return Err(TunnelError::invalid_config(format!(
            "{section}.name cannot contain whitespace"
        )));
    }

    sanitize_hostname(local_host).map_err(config_error)?;
    parse_port(local_port).map_err(config_error)?;
    Ok(())
}

fn command_spec(field: &str, command: &[String]) -> Result<LaunchSpec> {
    let Some((program, args)) = command.split_first() else {
        return Err(TunnelError::invalid_config(format!("{field} cannot be empty")));
    };

    validate_program_path(program).map_err(config_error)?;
    Ok(LaunchSpec::new(AllowedProgram::Jupyter)
        .with_program_path(program.clone())
        .args(args.iter().cloned()))
}

/// Accept `local_port = "8123"` as well as `local_port = 8123`.
fn port_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Text(String),
        Number(u64),
    }

    Ok(match PortValue::deserialize(deserializer)? {
        PortValue::Text(text) => text,
        PortValue::Number(number) => number.to_string(),
    })
}
