//! Multi-step peer provisioning.
//!
//! Provisioning touches the device several times in a fixed order. There is
//! no compensating rollback: the first failing step aborts the call and the
//! caller sees the underlying command error, with earlier steps left in
//! place for reconciliation. The allocation lock is held from the in-use
//! read through device registration, so at most one allocation-to-
//! registration sequence executes at a time and two concurrent calls can
//! never pick the same address.

use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};
use warden_exec::CommandRunner;

use crate::allocator;
use crate::artifact::{self, ClientConfigParams};
use crate::commands;
use crate::config::DeviceConfig;
use crate::error::Result;

/// Everything handed back to the caller after a successful provision.
///
/// The private key is embedded in `config_text` and is not surfaced
/// separately; the core never persists it.
#[derive(Clone, Debug)]
pub struct ProvisionedPeer {
    /// The peer's public key, unique on the device.
    pub public_key: String,
    /// Allocated address, single-host CIDR.
    pub client_address: String,
    /// Rendered client configuration.
    pub config_text: String,
    /// Path of the config artifact on the device.
    pub config_path: String,
    /// SVG QR image encoding `config_text`.
    pub qr_svg: String,
}

/// Orchestrates peer creation and removal on the tunnel device.
#[derive(Clone)]
pub struct PeerRegistry<R> {
    runner: R,
    config: DeviceConfig,
    alloc_lock: Arc<Mutex<()>>,
    server_key: Arc<OnceCell<String>>,
}

impl<R: CommandRunner> PeerRegistry<R> {
    /// Creates a registry over the given transport and device config.
    #[must_use]
    pub fn new(runner: R, config: DeviceConfig) -> Self {
        Self {
            runner,
            config,
            alloc_lock: Arc::new(Mutex::new(())),
            server_key: Arc::new(OnceCell::new()),
        }
    }

    /// Returns the device configuration.
    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// The server's public key, fetched once and cached for the lifetime of
    /// the registry.
    pub async fn server_public_key(&self) -> Result<&str> {
        let key = self
            .server_key
            .get_or_try_init(|| async {
                self.runner
                    .run(&commands::server_public_key(&self.config.interface))
                    .await
            })
            .await?;
        Ok(key.as_str())
    }

    /// Provisions a new peer for `account_id`.
    ///
    /// Steps, each a device command: keypair generation, address allocation
    /// plus registration (under the allocation lock), persisted-config
    /// append, client config rendering, route addition, config artifact
    /// write, QR rendering.
    ///
    /// # Errors
    ///
    /// Surfaces the first failing step's error unchanged. Completed steps
    /// are not rolled back.
    pub async fn provision(&self, account_id: i64) -> Result<ProvisionedPeer> {
        let iface = self.config.interface.clone();

        let private_key = self.runner.run(&commands::generate_private_key()).await?;
        let public_key = self.runner.run(&commands::derive_public_key(&private_key)).await?;

        let client_address = {
            // Lock spans the read of the in-use set and the registration,
            // closing the read-then-act window.
            let _allocating = self.alloc_lock.lock().await;
            let address = allocator::next_available(&self.runner, &iface, &self.config.ranges).await?;
            self.runner
                .run(&commands::register_peer(&iface, &public_key, &address))
                .await?;
            address
        };

        self.runner
            .run(&commands::append_server_config(
                &iface,
                &artifact::server_peer_block(&public_key, &client_address),
            ))
            .await?;

        let server_public_key = self.server_public_key().await?.to_string();
        let config_text = artifact::client_config(&ClientConfigParams {
            private_key: &private_key,
            client_address: &client_address,
            server_public_key: &server_public_key,
            endpoint: &self.config.endpoint,
            dns: &self.config.dns,
        });

        self.runner.run(&commands::route_add(&client_address, &iface)).await?;

        let config_path = format!("{}/peer-{}.conf", self.config.config_dir, account_id);
        self.runner
            .run(&commands::write_client_config(&config_path, &config_text))
            .await?;

        let qr_svg = artifact::qr_svg(&config_text)?;

        info!(
            account_id,
            address = %client_address,
            public_key = %public_key,
            "provisioned peer"
        );

        Ok(ProvisionedPeer {
            public_key,
            client_address,
            config_text,
            config_path,
            qr_svg,
        })
    }

    /// Removes a peer from the running device state.
    ///
    /// The persisted-config entry and the route are left behind; the access
    /// controller owns route teardown when access is revoked.
    pub async fn remove(&self, public_key: &str) -> Result<()> {
        self.runner
            .run(&commands::remove_peer(&self.config.interface, public_key))
            .await?;
        warn!(public_key = %public_key, "removed peer from running device state");
        Ok(())
    }

    /// Raw `wg show` status passthrough.
    pub async fn status(&self) -> Result<String> {
        Ok(self.runner.run(&commands::show_interface(&self.config.interface)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::AddressRange;
    use crate::error::DeviceError;
    use crate::testing::{FAKE_SERVER_PUBLIC_KEY, FakeDevice};

    fn registry(device: &FakeDevice) -> PeerRegistry<FakeDevice> {
        PeerRegistry::new(device.clone(), DeviceConfig::default())
    }

    // ==================== Provisioning Tests ====================

    #[tokio::test]
    async fn provision_on_fresh_device() {
        let device = FakeDevice::new();
        let peer = registry(&device).provision(42).await.expect("provision");

        assert!(AddressRange::default().contains(peer.client_address.strip_suffix("/32").expect("mask")));
        assert!(peer.config_text.contains(&peer.client_address));
        assert!(peer.config_text.contains(FAKE_SERVER_PUBLIC_KEY));
        assert_eq!(peer.config_path, "/etc/wireguard/config/peer-42.conf");
        assert!(peer.qr_svg.contains("<svg"));

        // Runtime registration and the durable config write are separate.
        assert_eq!(device.peers().get(&peer.public_key), Some(&peer.client_address));
        let persisted = device.file("/etc/wireguard/wg0.conf").expect("server config");
        assert!(persisted.contains(&peer.public_key));
        assert_eq!(device.file(&peer.config_path).as_deref(), Some(peer.config_text.as_str()));
        assert!(device.routes().contains(&peer.client_address));
    }

    #[tokio::test]
    async fn provision_skips_addresses_already_in_use() {
        let device = FakeDevice::new();
        device.seed_peer("EXISTING_A=", "10.0.0.2/32");
        device.seed_peer("EXISTING_B=", "10.0.0.3/32");

        let peer = registry(&device).provision(7).await.expect("provision");
        assert_eq!(peer.client_address, "10.0.0.4/32");
    }

    #[tokio::test]
    async fn provision_fails_when_ranges_are_exhausted() {
        let device = FakeDevice::new();
        device.seed_peer("EXISTING=", "10.0.0.2/32");

        let config = DeviceConfig::default().with_ranges(vec![AddressRange::new("10.0.0", 2, 2)]);
        let result = PeerRegistry::new(device, config).provision(1).await;
        assert!(matches!(result, Err(DeviceError::NoAddressAvailable)));
    }

    #[tokio::test]
    async fn failed_step_aborts_without_rollback() {
        let device = FakeDevice::new();
        device.fail_on("ip route add");

        let result = registry(&device).provision(9).await;
        assert!(matches!(result, Err(DeviceError::Exec(_))));

        // Earlier steps stay committed: the peer is registered on the
        // device even though provisioning failed.
        assert_eq!(device.peers().len(), 1);
        assert!(device.file("/etc/wireguard/wg0.conf").is_some());
    }

    #[tokio::test]
    async fn concurrent_provisions_never_share_an_address() {
        let device = FakeDevice::new();
        let registry = registry(&device);

        let tasks: Vec<_> = (0..20)
            .map(|account| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.provision(account).await })
            })
            .collect();

        let mut addresses = std::collections::HashSet::new();
        for task in tasks {
            let peer = task.await.expect("join").expect("provision");
            assert!(addresses.insert(peer.client_address.clone()), "duplicate address allocated");
        }
        assert_eq!(addresses.len(), 20);
        assert_eq!(device.peers().len(), 20);
    }

    // ==================== Removal and Status Tests ====================

    #[tokio::test]
    async fn remove_drops_only_the_named_peer() {
        let device = FakeDevice::new();
        device.seed_peer("KEEP=", "10.0.0.2/32");
        device.seed_peer("DROP=", "10.0.0.3/32");

        registry(&device).remove("DROP=").await.expect("remove");
        let peers = device.peers();
        assert!(peers.contains_key("KEEP="));
        assert!(!peers.contains_key("DROP="));
    }

    #[tokio::test]
    async fn server_public_key_is_fetched_once() {
        let device = FakeDevice::new();
        let registry = registry(&device);

        let first = registry.server_public_key().await.expect("key").to_string();
        let second = registry.server_public_key().await.expect("key").to_string();
        assert_eq!(first, FAKE_SERVER_PUBLIC_KEY);
        assert_eq!(first, second);

        let fetches = device
            .transcript()
            .iter()
            .filter(|c| c.as_str() == "wg show wg0 public-key")
            .count();
        assert_eq!(fetches, 1);
    }
}
