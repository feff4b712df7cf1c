//! Local address resolution

use tracing::{debug, warn};

/// Resolve the address this host should advertise.
///
/// Prefers the IP of the default-route interface and falls back to the
/// hostname. Returns an empty string when neither is available.
pub fn resolve_local_address() -> String {
    match local_ip_address::local_ip() {
        Ok(ip) => {
            debug!("Resolved local address {}", ip);
            ip.to_string()
        }
        Err(e) => {
            warn!("Failed to detect local IP address, falling back to hostname: {}", e);
            hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_default()
        }
    }
}
