//! The device command set.
//!
//! These argv shapes are the wire contract with the tunnel daemon (`wg`),
//! the firewall tooling (`iptables`, `netfilter-persistent`) and the
//! routing table (`ip route`). Changing them breaks compatibility with the
//! device, so every command string lives here and nowhere else.
//!
//! Payloads the original tooling piped through a shell (`echo '…' | wg
//! pubkey`, `echo '…' >> wg0.conf`) travel on stdin via `wg pubkey` and
//! `tee` instead, which keeps key material and config text out of argv.

use warden_exec::CommandLine;

/// `wg genkey` — generates a new private key.
#[must_use]
pub fn generate_private_key() -> CommandLine {
    CommandLine::new("wg").arg("genkey")
}

/// `wg pubkey` with the private key on stdin — derives the public key.
#[must_use]
pub fn derive_public_key(private_key: &str) -> CommandLine {
    CommandLine::new("wg").arg("pubkey").with_stdin(private_key)
}

/// `wg show <iface>` — full interface status.
#[must_use]
pub fn show_interface(interface: &str) -> CommandLine {
    CommandLine::new("wg").args(["show", interface])
}

/// `wg show <iface> public-key` — the server's public key.
#[must_use]
pub fn server_public_key(interface: &str) -> CommandLine {
    CommandLine::new("wg").args(["show", interface, "public-key"])
}

/// `wg show <iface> allowed-ips` — the in-use address assignments.
#[must_use]
pub fn show_allowed_ips(interface: &str) -> CommandLine {
    CommandLine::new("wg").args(["show", interface, "allowed-ips"])
}

/// `wg set <iface> peer <pk> allowed-ips <addr>` — registers a peer in the
/// running device state. Runtime-only; does not survive a device restart.
#[must_use]
pub fn register_peer(interface: &str, public_key: &str, address: &str) -> CommandLine {
    CommandLine::new("wg").args(["set", interface, "peer", public_key, "allowed-ips", address])
}

/// `wg set <iface> peer <pk> remove` — removes a peer from running state.
#[must_use]
pub fn remove_peer(interface: &str, public_key: &str) -> CommandLine {
    CommandLine::new("wg").args(["set", interface, "peer", public_key, "remove"])
}

/// Appends a peer block to the daemon's persisted config file, so the peer
/// survives a device restart.
#[must_use]
pub fn append_server_config(interface: &str, peer_block: &str) -> CommandLine {
    CommandLine::new("tee")
        .arg("-a")
        .arg(format!("/etc/wireguard/{interface}.conf"))
        .with_stdin(peer_block)
}

/// Writes a client config artifact to the given path.
#[must_use]
pub fn write_client_config(path: &str, config_text: &str) -> CommandLine {
    CommandLine::new("tee").arg(path).with_stdin(config_text)
}

/// `ip route add <addr> dev <iface>`.
#[must_use]
pub fn route_add(address: &str, interface: &str) -> CommandLine {
    CommandLine::new("ip").args(["route", "add", address, "dev", interface])
}

/// `ip route del <addr> dev <iface>`.
#[must_use]
pub fn route_del(address: &str, interface: &str) -> CommandLine {
    CommandLine::new("ip").args(["route", "del", address, "dev", interface])
}

/// Direction of a drop rule relative to the tunnel interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropDirection {
    /// Traffic entering the device from the client address.
    Inbound,
    /// Traffic leaving the device toward the client address.
    Outbound,
}

fn drop_rule_spec(direction: DropDirection, interface: &str, address: &str) -> [String; 6] {
    match direction {
        DropDirection::Inbound => [
            "-i".into(),
            interface.into(),
            "-s".into(),
            address.into(),
            "-j".into(),
            "DROP".into(),
        ],
        DropDirection::Outbound => [
            "-o".into(),
            interface.into(),
            "-d".into(),
            address.into(),
            "-j".into(),
            "DROP".into(),
        ],
    }
}

/// `iptables -C FORWARD …` — checks whether the drop rule is present.
#[must_use]
pub fn drop_rule_check(direction: DropDirection, interface: &str, address: &str) -> CommandLine {
    CommandLine::new("iptables")
        .args(["-C", "FORWARD"])
        .args(drop_rule_spec(direction, interface, address))
}

/// `iptables -A FORWARD …` — appends the drop rule.
#[must_use]
pub fn drop_rule_add(direction: DropDirection, interface: &str, address: &str) -> CommandLine {
    CommandLine::new("iptables")
        .args(["-A", "FORWARD"])
        .args(drop_rule_spec(direction, interface, address))
}

/// `iptables -D FORWARD …` — deletes the drop rule.
#[must_use]
pub fn drop_rule_del(direction: DropDirection, interface: &str, address: &str) -> CommandLine {
    CommandLine::new("iptables")
        .args(["-D", "FORWARD"])
        .args(drop_rule_spec(direction, interface, address))
}

/// `netfilter-persistent save`.
#[must_use]
pub fn persist_rules() -> CommandLine {
    CommandLine::new("netfilter-persistent").arg("save")
}

/// `netfilter-persistent reload`.
#[must_use]
pub fn reload_rules() -> CommandLine {
    CommandLine::new("netfilter-persistent").arg("reload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn peer_commands_render_verbatim() {
        assert_eq!(generate_private_key().rendered(), "wg genkey");
        assert_eq!(show_allowed_ips("wg0").rendered(), "wg show wg0 allowed-ips");
        assert_eq!(
            register_peer("wg0", "PK", "10.0.0.4/32").rendered(),
            "wg set wg0 peer PK allowed-ips 10.0.0.4/32"
        );
        assert_eq!(remove_peer("wg0", "PK").rendered(), "wg set wg0 peer PK remove");
        assert_eq!(server_public_key("wg0").rendered(), "wg show wg0 public-key");
    }

    #[test_case(DropDirection::Inbound, "iptables -A FORWARD -i wg0 -s 10.0.0.4/32 -j DROP")]
    #[test_case(DropDirection::Outbound, "iptables -A FORWARD -o wg0 -d 10.0.0.4/32 -j DROP")]
    fn drop_rules_render_verbatim(direction: DropDirection, expected: &str) {
        assert_eq!(drop_rule_add(direction, "wg0", "10.0.0.4/32").rendered(), expected);
    }

    #[test]
    fn config_writes_carry_payload_on_stdin() {
        let cmd = append_server_config("wg0", "[Peer]\n");
        assert_eq!(cmd.rendered(), "tee -a /etc/wireguard/wg0.conf");
        assert_eq!(cmd.stdin(), Some("[Peer]\n"));

        let cmd = write_client_config("/etc/wireguard/config/peer-1.conf", "cfg");
        assert_eq!(cmd.rendered(), "tee /etc/wireguard/config/peer-1.conf");
        assert_eq!(cmd.stdin(), Some("cfg"));
    }

    #[test]
    fn route_commands_render_verbatim() {
        assert_eq!(route_add("10.0.0.4/32", "wg0").rendered(), "ip route add 10.0.0.4/32 dev wg0");
        assert_eq!(route_del("10.0.0.4/32", "wg0").rendered(), "ip route del 10.0.0.4/32 dev wg0");
    }
}
