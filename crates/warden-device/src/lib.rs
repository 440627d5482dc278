//! WireGuard device operations for tunnelwarden.
//!
//! Everything here talks to the tunnel device through a
//! [`warden_exec::CommandRunner`] and nothing caches device state: the
//! in-use address set is re-read on every allocation and access state is
//! whatever the firewall rule table says, so external drift cannot
//! accumulate in memory.
//!
//! - [`allocator`] — first-free address selection over configured ranges
//! - [`registry`] — multi-step peer provisioning and removal
//! - [`access`] — idempotent firewall/routing block and unblock
//! - [`artifact`] — client config text and QR rendering
//! - [`commands`] — the verbatim device command set
//! - [`testing`] — an in-memory device simulation for tests

#![forbid(unsafe_code)]

pub mod access;
pub mod allocator;
pub mod artifact;
pub mod commands;
pub mod config;
pub mod error;
pub mod registry;
pub mod testing;

pub use access::AccessController;
pub use allocator::AddressRange;
pub use config::DeviceConfig;
pub use error::{DeviceError, Result};
pub use registry::{PeerRegistry, ProvisionedPeer};
