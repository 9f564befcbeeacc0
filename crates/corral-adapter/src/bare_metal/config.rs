//! Configuration of the bare-metal adapter.

use std::path::PathBuf;
use std::time::Duration;

/// Settings of the bare-metal adapter, usually read from the environment.
#[derive(Debug, Clone)]
pub struct BareMetalConfig {
    /// TFTP root holding `pxelinux.cfg/`.
    pub tftp_root: PathBuf,
    /// Script invoked for power and provisioning actions.
    pub hook_script: Option<PathBuf>,
    /// DNS zone appended to unqualified host names.
    pub dns_zone: Option<String>,
    /// Packet capture program used for DHCP discovery.
    pub capture_program: String,
    /// Upper bound on one discovery poll.
    pub discovery_poll_interval: Duration,
    /// Installer host whose software profile must carry `dhcpd`.
    pub installer_node: Option<String>,
}

impl Default for BareMetalConfig {
    fn default() -> Self {
        Self {
            tftp_root: PathBuf::from("/tftpboot"),
            hook_script: None,
            dns_zone: None,
            capture_program: "tcpdump".to_string(),
            discovery_poll_interval: Duration::from_secs(5),
            installer_node: None,
        }
    }
}

impl BareMetalConfig {
    /// Read the configuration from `CORRAL_*` environment variables.
    ///
    /// Missing or unparsable values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        Self {
            tftp_root: non_empty("CORRAL_TFTP_ROOT").map_or(defaults.tftp_root, PathBuf::from),
            hook_script: non_empty("CORRAL_HOOK_SCRIPT").map(PathBuf::from),
            dns_zone: non_empty("CORRAL_DNS_ZONE"),
            capture_program: non_empty("CORRAL_CAPTURE_PROGRAM")
                .unwrap_or(defaults.capture_program),
            discovery_poll_interval: non_empty("CORRAL_DISCOVERY_POLL_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map_or(defaults.discovery_poll_interval, Duration::from_secs),
            installer_node: non_empty("CORRAL_INSTALLER_NODE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BareMetalConfig::default();
        assert_eq!(config.tftp_root, PathBuf::from("/tftpboot"));
        assert_eq!(config.capture_program, "tcpdump");
        assert_eq!(config.discovery_poll_interval, Duration::from_secs(5));
        assert!(config.hook_script.is_none());
    }
}
