//! An in-memory tunnel device simulation.
//!
//! [`FakeDevice`] implements [`CommandRunner`] over a simulated device:
//! peer table, firewall rule list, routing table and config files. It
//! understands exactly the command set in [`crate::commands`] and fails
//! anything else, so a drifting command string shows up as a test failure.
//! Cloning shares state, which lets one simulated device back several
//! components at once.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;
use warden_exec::{CommandLine, CommandRunner, ExecError};

/// The server public key every fake device reports.
pub const FAKE_SERVER_PUBLIC_KEY: &str = "FAKE_SERVER_PUBLIC_KEY=";

#[derive(Default)]
struct DeviceState {
    peers: BTreeMap<String, String>,
    drop_rules: Vec<String>,
    routes: BTreeSet<String>,
    files: BTreeMap<String, String>,
    key_counter: u64,
    persist_count: u64,
    fail_prefixes: Vec<String>,
    transcript: Vec<String>,
}

/// A shared, in-memory stand-in for the tunnel device.
#[derive(Clone, Default)]
pub struct FakeDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl FakeDevice {
    /// Creates a fresh device with no peers, rules or routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces commands whose rendered form starts with `prefix` to fail.
    pub fn fail_on(&self, prefix: impl Into<String>) {
        self.state.lock().fail_prefixes.push(prefix.into());
    }

    /// Registered peers as `public key → address`.
    #[must_use]
    pub fn peers(&self) -> BTreeMap<String, String> {
        self.state.lock().peers.clone()
    }

    /// The firewall drop rules currently installed, in insertion order.
    #[must_use]
    pub fn drop_rules(&self) -> Vec<String> {
        self.state.lock().drop_rules.clone()
    }

    /// The routing table entries currently installed.
    #[must_use]
    pub fn routes(&self) -> BTreeSet<String> {
        self.state.lock().routes.clone()
    }

    /// Contents of a written file, if any.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().files.get(path).cloned()
    }

    /// How many times the rule set was persisted.
    #[must_use]
    pub fn persist_count(&self) -> u64 {
        self.state.lock().persist_count
    }

    /// Every command run against the device, rendered, in order.
    #[must_use]
    pub fn transcript(&self) -> Vec<String> {
        self.state.lock().transcript.clone()
    }

    /// Pre-registers a peer, as if provisioned earlier.
    pub fn seed_peer(&self, public_key: impl Into<String>, address: impl Into<String>) {
        self.state.lock().peers.insert(public_key.into(), address.into());
    }
}

fn command_failed(cmd: &CommandLine, status: i32, stderr: &str) -> ExecError {
    ExecError::CommandFailed {
        command: cmd.rendered(),
        status,
        stderr: stderr.to_string(),
    }
}

impl CommandRunner for FakeDevice {
    async fn run(&self, cmd: &CommandLine) -> Result<String, ExecError> {
        let mut state = self.state.lock();
        let rendered = cmd.rendered();
        state.transcript.push(rendered.clone());

        if state.fail_prefixes.iter().any(|p| rendered.starts_with(p.as_str())) {
            return Err(command_failed(cmd, 1, "injected failure"));
        }

        let argv: Vec<&str> = cmd.argv().iter().map(String::as_str).collect();
        match (cmd.program(), argv.as_slice()) {
            ("wg", ["genkey"]) => {
                state.key_counter += 1;
                Ok(format!("FAKE_PRIVATE_{}=", state.key_counter))
            }
            ("wg", ["pubkey"]) => {
                let private = cmd
                    .stdin()
                    .ok_or_else(|| command_failed(cmd, 1, "wg: no key on stdin"))?;
                Ok(private.trim().replace("PRIVATE", "PUBLIC"))
            }
            ("wg", ["show", _iface, "public-key"]) => Ok(FAKE_SERVER_PUBLIC_KEY.to_string()),
            ("wg", ["show", _iface, "allowed-ips"]) => {
                let lines: Vec<String> = state
                    .peers
                    .iter()
                    .map(|(pk, addr)| format!("{pk}\t{addr}"))
                    .collect();
                Ok(lines.join("\n"))
            }
            ("wg", ["show", iface]) => Ok(format!("interface: {iface}\n  peers: {}", state.peers.len())),
            ("wg", ["set", _iface, "peer", pk, "allowed-ips", addr]) => {
                state.peers.insert((*pk).to_string(), (*addr).to_string());
                Ok(String::new())
            }
            ("wg", ["set", _iface, "peer", pk, "remove"]) => {
                state.peers.remove(*pk);
                Ok(String::new())
            }
            ("iptables", ["-C", "FORWARD", spec @ ..]) => {
                let rule = spec.join(" ");
                if state.drop_rules.contains(&rule) {
                    Ok(String::new())
                } else {
                    Err(command_failed(cmd, 1, "iptables: Bad rule (does a matching rule exist in that chain?)."))
                }
            }
            ("iptables", ["-A", "FORWARD", spec @ ..]) => {
                state.drop_rules.push(spec.join(" "));
                Ok(String::new())
            }
            ("iptables", ["-D", "FORWARD", spec @ ..]) => {
                let rule = spec.join(" ");
                if let Some(pos) = state.drop_rules.iter().position(|r| *r == rule) {
                    state.drop_rules.remove(pos);
                    Ok(String::new())
                } else {
                    Err(command_failed(cmd, 1, "iptables: Bad rule (does a matching rule exist in that chain?)."))
                }
            }
            ("netfilter-persistent", ["save"]) => {
                state.persist_count += 1;
                Ok(String::new())
            }
            ("netfilter-persistent", ["reload"]) => Ok(String::new()),
            ("ip", ["route", "add", addr, "dev", _iface]) => {
                if state.routes.insert((*addr).to_string()) {
                    Ok(String::new())
                } else {
                    Err(command_failed(cmd, 2, "RTNETLINK answers: File exists"))
                }
            }
            ("ip", ["route", "del", addr, "dev", _iface]) => {
                if state.routes.remove(*addr) {
                    Ok(String::new())
                } else {
                    Err(command_failed(cmd, 2, "RTNETLINK answers: No such process"))
                }
            }
            ("tee", ["-a", path]) => {
                let payload = cmd.stdin().unwrap_or_default().to_string();
                state.files.entry((*path).to_string()).or_default().push_str(&payload);
                Ok(payload)
            }
            ("tee", [path]) => {
                let payload = cmd.stdin().unwrap_or_default().to_string();
                state.files.insert((*path).to_string(), payload.clone());
                Ok(payload)
            }
            _ => Err(command_failed(cmd, 127, "command not found")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{self, DropDirection};

    #[tokio::test]
    async fn keypair_generation_is_deterministic_per_device() {
        let device = FakeDevice::new();
        let private = device.run(&commands::generate_private_key()).await.expect("genkey");
        assert_eq!(private, "FAKE_PRIVATE_1=");

        let public = device.run(&commands::derive_public_key(&private)).await.expect("pubkey");
        assert_eq!(public, "FAKE_PUBLIC_1=");
    }

    #[tokio::test]
    async fn peer_registration_shows_up_in_allowed_ips() {
        let device = FakeDevice::new();
        device
            .run(&commands::register_peer("wg0", "PK=", "10.0.0.2/32"))
            .await
            .expect("register");

        let output = device.run(&commands::show_allowed_ips("wg0")).await.expect("show");
        assert_eq!(output, "PK=\t10.0.0.2/32");
    }

    #[tokio::test]
    async fn deleting_missing_rule_fails_like_iptables() {
        let device = FakeDevice::new();
        let err = device
            .run(&commands::drop_rule_del(DropDirection::Inbound, "wg0", "10.0.0.2/32"))
            .await
            .expect_err("no such rule");
        assert!(err.is_command_failure());
    }

    #[tokio::test]
    async fn unknown_commands_are_rejected() {
        let device = FakeDevice::new();
        let err = device
            .run(&CommandLine::new("wg-quick").arg("up"))
            .await
            .expect_err("unknown command");
        assert!(err.is_command_failure());
    }
}
