//! Device configuration.

use serde::{Deserialize, Serialize};

use crate::allocator::AddressRange;

/// Static configuration for the tunnel device.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Tunnel interface name.
    pub interface: String,
    /// Public endpoint clients connect to, `host:port`.
    pub endpoint: String,
    /// DNS server handed to clients.
    pub dns: String,
    /// Directory (inside the container) where client configs are written.
    pub config_dir: String,
    /// Address ranges clients are allocated from, scanned in order.
    pub ranges: Vec<AddressRange>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            interface: "wg0".to_string(),
            endpoint: "vpn.example.com:51820".to_string(),
            dns: "8.8.8.8".to_string(),
            config_dir: "/etc/wireguard/config".to_string(),
            ranges: vec![AddressRange::default()],
        }
    }
}

impl DeviceConfig {
    /// Creates a config for the given endpoint with defaults elsewhere.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Sets the tunnel interface name.
    #[must_use]
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = interface.into();
        self
    }

    /// Sets the client DNS server.
    #[must_use]
    pub fn with_dns(mut self, dns: impl Into<String>) -> Self {
        self.dns = dns.into();
        self
    }

    /// Sets the client config directory.
    #[must_use]
    pub fn with_config_dir(mut self, dir: impl Into<String>) -> Self {
        self.config_dir = dir.into();
        self
    }

    /// Replaces the allocation ranges.
    #[must_use]
    pub fn with_ranges(mut self, ranges: Vec<AddressRange>) -> Self {
        self.ranges = ranges;
        self
    }
}
