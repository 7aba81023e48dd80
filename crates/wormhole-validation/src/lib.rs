//! Checks for everything the tunnel switches put on a command line.
//!
//! Subdomains, relay hosts, upstream URLs, local ports and the relay token
//! all come from configuration or the machine itself and end up as argv
//! entries of the `inlets` client. Each is checked here and handed back as
//! a [`Sanitized`] value tagged with what it was checked as.
//!
//! ```
//! use wormhole_validation::{parse_port, sanitize_hostname, sanitize_subdomain};
//!
//! let sub = sanitize_subdomain("myhouse")?;
//! let host = sanitize_hostname(&format!("{sub}.wormhole.eliteu.cn"))?;
//! assert_eq!(host.as_str(), "myhouse.wormhole.eliteu.cn");
//! assert_eq!(parse_port("8123")?.get(), 8123);
//! # Ok::<(), wormhole_validation::ValidationError>(())
//! ```
//!
//! With the `command` feature, [`command::CheckedCommand`] starts the
//! allowed programs directly, never through a shell.

#![deny(unsafe_code)]
#![warn(missing_docs)]

#[cfg(feature = "command")]
pub mod command;
mod error;
mod numeric;
mod sanitized;
mod strings;

pub use error::{Rejection, ValidationError};
pub use numeric::{Port, parse_port};
pub use sanitized::{AuthToken, Hostname, Kind, Sanitized, Subdomain, Url};
pub use strings::{sanitize_auth_token, sanitize_hostname, sanitize_subdomain, sanitize_url};

/// Longest DNS label.
pub const MAX_LABEL_LENGTH: usize = 63;

/// Longest hostname.
pub const MAX_HOSTNAME_LENGTH: usize = 253;

/// Longest accepted URL.
pub const MAX_URL_LENGTH: usize = 2048;

/// Longest accepted relay token.
pub const MAX_TOKEN_LENGTH: usize = 512;
