//! Subdomain derivation from a stable machine identifier.
//!
//! When no subdomain is configured, the node's 48-bit hardware address is
//! encoded as lowercase, unpadded RFC 4648 base32 over its minimal big-endian
//! bytes. The same machine always maps to the same public host.

use std::path::Path;

use data_encoding::BASE32_NOPAD;
use tracing::debug;
use wormhole_validation::sanitize_subdomain;

use crate::error::{Result, TunnelError};

/// Where network interfaces are listed on Linux.
pub const SYSFS_NET_DIR: &str = "/sys/class/net";

/// Machine id files tried when no hardware address is found.
pub const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Encode a node identifier as a subdomain label.
///
/// Uses the minimal number of big-endian bytes, so `0x1` encodes a single
/// byte. Zero encodes to the empty string.
///
/// ```
/// use wormhole_tunnel::subdomain::subdomain_from_node_id;
///
/// assert_eq!(subdomain_from_node_id(0x0242_ac11_0002), "ajbkyeiaai");
/// ```
#[must_use]
pub fn subdomain_from_node_id(node_id: u64) -> String {
    let bit_length = 64 - node_id.leading_zeros() as usize;
    let byte_len = bit_length.div_ceil(8);
    let bytes = node_id.to_be_bytes();
    BASE32_NOPAD
        .encode(&bytes[bytes.len() - byte_len..])
        .to_lowercase()
}

/// Parse a colon separated 48-bit hardware address.
fn parse_mac(mac: &str) -> Option<u64> {
    let parts: Vec<&str> = mac.trim().split(':').collect();
    if parts.len() != 6 {
        return None;
    }

    parts.iter().try_fold(0u64, |acc, part| {
        if part.len() != 2 {
            return None;
        }
        u8::from_str_radix(part, 16)
            .ok()
            .map(|byte| (acc << 8) | u64::from(byte))
    })
}

/// Whether a MAC was assigned by its vendor rather than locally.
fn is_universal(id: u64) -> bool {
    (id >> 40) & 0x02 == 0
}

/// Non-loopback interface with a non-zero hardware address, by name.
///
/// A vendor-assigned address wins over a locally administered one such as
/// a bridge or container veth, which falls back only when nothing else is
/// present.
pub fn node_id_from_sysfs(net_dir: &Path) -> Option<u64> {
    let entries = std::fs::read_dir(net_dir).ok()?;

    let mut names: Vec<String> = entries
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| name != "lo")
        .collect();
    names.sort();

    let candidates: Vec<(String, u64)> = names
        .into_iter()
        .filter_map(|name| {
            let address = std::fs::read_to_string(net_dir.join(&name).join("address")).ok()?;
            let id = parse_mac(&address).filter(|id| *id != 0)?;
            Some((name, id))
        })
        .collect();

    let (name, id) = candidates
        .iter()
        .find(|(_, id)| is_universal(*id))
        .or_else(|| candidates.first())?;
    debug!(interface = %name, universal = is_universal(*id), "derived node id from hardware address");
    Some(*id)
}

/// First 48 bits of a hex machine id file.
pub fn node_id_from_machine_id(path: &Path) -> Option<u64> {
    let content = std::fs::read_to_string(path).ok()?;
    let hex = content.trim().get(..12)?;
    u64::from_str_radix(hex, 16).ok().filter(|id| *id != 0)
}

/// The identifier of this machine.
///
/// # Errors
///
/// Returns `TunnelError::MachineIdUnavailable` if neither a hardware address
/// nor a machine id file is available.
pub fn local_node_id() -> Result<u64> {
    if let Some(id) = node_id_from_sysfs(Path::new(SYSFS_NET_DIR)) {
        return Ok(id);
    }

    MACHINE_ID_PATHS
        .iter()
        .find_map(|path| node_id_from_machine_id(Path::new(path)))
        .ok_or_else(|| {
            TunnelError::machine_id_unavailable(format!(
                "no hardware address under {SYSFS_NET_DIR} and no readable {}",
                MACHINE_ID_PATHS.join(" or ")
            ))
        })
}

/// The configured subdomain, or one derived from this machine.
///
/// # Errors
///
/// Returns `TunnelError::InvalidConfig` if the configured value is not a
/// valid label, or the derivation error.
pub fn resolve_subdomain(configured: Option<&str>) -> Result<String> {
    match configured {
        Some(value) => sanitize_subdomain(value)
            .map(wormhole_validation::Sanitized::into_inner)
            .map_err(|e| TunnelError::invalid_config(e.to_string())),
        None => subdomain_for_node(local_node_id()?),
    }
}

/// Derive and validate the subdomain for a node identifier.
///
/// # Errors
///
/// Returns `TunnelError::MachineIdUnavailable` for node id 0, which has no
/// encoding.
pub fn subdomain_for_node(node_id: u64) -> Result<String> {
    let encoded = subdomain_from_node_id(node_id);
    if encoded.is_empty() {
        return Err(TunnelError::machine_id_unavailable(
            "node id 0 cannot be encoded as a subdomain",
        ));
    }
    Ok(encoded)
}
