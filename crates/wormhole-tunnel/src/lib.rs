//! On/off switches that expose local services through an inlets relay.
//!
//! Each switch owns at most one tunnel client process. Turning it on
//! launches `inlets client` against `wss://<subdomain>.<relay>` and
//! publishes the public URL; turning it off stops the client. The notebook
//! switch additionally looks up the notebook server's login token.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wormhole_tunnel::{SystemLauncher, Switchboard, WormholeConfig};
//!
//! # async fn example() -> wormhole_tunnel::Result<()> {
//! let config = WormholeConfig::from_file("/etc/wormhole/wormhole.toml")?;
//! let board = Switchboard::from_config(&config, Arc::new(SystemLauncher::new())).await?;
//!
//! board.turn_on("public-access").await?;
//! for status in board.statuses().await {
//!     println!("{}: {:?}", status.name, status.attributes());
//! }
//! board.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
// Tests need unsafe for env var manipulation in Rust 2024
#![cfg_attr(test, allow(unsafe_code))]
#![warn(missing_docs)]

pub mod auth;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod jupyter;
pub mod launcher;
pub mod subdomain;
mod supervisor;
pub mod switchboard;

pub use auth::{AuthMethod, AuthToken};
pub use config::{AlreadyOnPolicy, TunnelConfig, WormholeConfig};
pub use controller::{Transition, TunnelController, TunnelStatus};
pub use discovery::TokenDiscovery;
pub use error::{Result, TunnelError};
pub use jupyter::JupyterTunnelController;
pub use launcher::{ExitReport, LaunchSpec, ProcessLauncher, SystemLauncher};
pub use switchboard::{Switch, Switchboard};
