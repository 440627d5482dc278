//! First-free address allocation.
//!
//! The in-use set is read fresh from the device on every allocation; no
//! reservation persists between "address chosen" and "address registered",
//! so the registry holds its allocation lock across both (see
//! [`crate::registry`]). Selection itself is a pure function: for a fixed
//! in-use set and fixed ranges it always returns the same address.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use warden_exec::CommandRunner;

use crate::commands;
use crate::error::{DeviceError, Result};

/// Host mask appended to every allocated address.
const HOST_MASK: &str = "/32";

/// A contiguous run of host addresses under a /24-style prefix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    /// Network prefix without the final octet, e.g. `10.0.0`.
    pub prefix: String,
    /// First host octet allocated, inclusive.
    pub first: u8,
    /// Last host octet allocated, inclusive.
    pub last: u8,
}

impl AddressRange {
    /// Creates a range over `prefix.first ..= prefix.last`.
    #[must_use]
    pub fn new(prefix: impl Into<String>, first: u8, last: u8) -> Self {
        Self {
            prefix: prefix.into(),
            first,
            last,
        }
    }

    /// True when the bare address (no mask) falls inside this range.
    #[must_use]
    pub fn contains(&self, address: &str) -> bool {
        let Some(rest) = address.strip_prefix(self.prefix.as_str()) else {
            return false;
        };
        let Some(octet) = rest.strip_prefix('.') else {
            return false;
        };
        octet
            .parse::<u8>()
            .is_ok_and(|n| n >= self.first && n <= self.last)
    }
}

impl Default for AddressRange {
    /// The device's client subnet: `10.0.0.2` through `10.0.0.254`
    /// (`.1` is the server).
    fn default() -> Self {
        Self::new("10.0.0", 2, 254)
    }
}

/// Parses `wg show <iface> allowed-ips` output into bare in-use addresses.
///
/// Each line is `<public-key>\t<cidr> [<cidr>…]`; masks are stripped.
#[must_use]
pub fn parse_in_use(output: &str) -> HashSet<String> {
    output
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .flat_map(|(_, cidrs)| cidrs.split_whitespace())
        .filter_map(|cidr| cidr.split('/').next())
        .filter(|addr| !addr.is_empty() && *addr != "(none)")
        .map(ToString::to_string)
        .collect()
}

/// Returns the first address not in `in_use`, scanning ranges in order and
/// host octets ascending, formatted with the single-host mask.
#[must_use]
pub fn first_free(ranges: &[AddressRange], in_use: &HashSet<String>) -> Option<String> {
    for range in ranges {
        for octet in range.first..=range.last {
            let candidate = format!("{}.{}", range.prefix, octet);
            if !in_use.contains(&candidate) {
                return Some(format!("{candidate}{HOST_MASK}"));
            }
        }
    }
    None
}

/// Queries the device for the in-use set and picks the next free address.
///
/// # Errors
///
/// Returns [`DeviceError::NoAddressAvailable`] when every range is
/// exhausted, or the underlying command error.
pub async fn next_available<R: CommandRunner>(
    runner: &R,
    interface: &str,
    ranges: &[AddressRange],
) -> Result<String> {
    let output = runner.run(&commands::show_allowed_ips(interface)).await?;
    let in_use = parse_in_use(&output);
    first_free(ranges, &in_use).ok_or(DeviceError::NoAddressAvailable)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn in_use(addrs: &[&str]) -> HashSet<String> {
        addrs.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn skips_in_use_addresses() {
        let ranges = [AddressRange::new("10.0.0", 2, 254)];
        let used = in_use(&["10.0.0.2", "10.0.0.3"]);
        assert_eq!(first_free(&ranges, &used).as_deref(), Some("10.0.0.4/32"));
    }

    #[test]
    fn empty_set_yields_first_host() {
        let ranges = [AddressRange::default()];
        assert_eq!(first_free(&ranges, &HashSet::new()).as_deref(), Some("10.0.0.2/32"));
    }

    #[test]
    fn exhausted_ranges_yield_none() {
        let ranges = [AddressRange::new("10.0.0", 2, 4)];
        let used = in_use(&["10.0.0.2", "10.0.0.3", "10.0.0.4"]);
        assert_eq!(first_free(&ranges, &used), None);
    }

    #[test]
    fn later_range_used_when_first_is_full() {
        let ranges = [AddressRange::new("10.0.0", 2, 3), AddressRange::new("10.0.1", 2, 254)];
        let used = in_use(&["10.0.0.2", "10.0.0.3"]);
        assert_eq!(first_free(&ranges, &used).as_deref(), Some("10.0.1.2/32"));
    }

    #[test]
    fn parses_allowed_ips_output() {
        let output = "pk-one\t10.0.0.2/32\npk-two\t10.0.0.3/32 fd00::3/128\npk-three\t(none)\n";
        let parsed = parse_in_use(output);
        assert!(parsed.contains("10.0.0.2"));
        assert!(parsed.contains("10.0.0.3"));
        assert!(parsed.contains("fd00::3"));
        assert!(!parsed.contains("(none)"));
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn range_contains_checks_prefix_and_bounds() {
        let range = AddressRange::new("10.0.0", 2, 254);
        assert!(range.contains("10.0.0.2"));
        assert!(range.contains("10.0.0.254"));
        assert!(!range.contains("10.0.0.1"));
        assert!(!range.contains("10.0.1.2"));
        assert!(!range.contains("192.168.0.2"));
    }

    #[tokio::test]
    async fn next_available_queries_device_once() {
        let fake = warden_exec::FakeRunner::new();
        fake.respond("wg show wg0 allowed-ips", "pk\t10.0.0.2/32\n");

        let ranges = [AddressRange::default()];
        let addr = next_available(&fake, "wg0", &ranges).await.expect("free address");
        assert_eq!(addr, "10.0.0.3/32");
        assert_eq!(fake.runs_matching("wg show wg0 allowed-ips"), 1);
    }

    #[tokio::test]
    async fn next_available_surfaces_exhaustion() {
        let fake = warden_exec::FakeRunner::new();
        fake.respond("wg show wg0 allowed-ips", "pk\t10.0.0.2/32\n");

        let ranges = [AddressRange::new("10.0.0", 2, 2)];
        let err = next_available(&fake, "wg0", &ranges).await.expect_err("exhausted");
        assert!(matches!(err, DeviceError::NoAddressAvailable));
    }

    proptest! {
        #[test]
        fn free_address_is_outside_in_use_and_inside_a_range(
            used_octets in proptest::collection::hash_set(2u8..=254, 0..64),
        ) {
            let ranges = [AddressRange::new("10.0.0", 2, 254)];
            let used: HashSet<String> =
                used_octets.iter().map(|o| format!("10.0.0.{o}")).collect();

            if let Some(addr) = first_free(&ranges, &used) {
                let bare = addr.strip_suffix("/32").expect("host mask");
                prop_assert!(!used.contains(bare));
                prop_assert!(ranges[0].contains(bare));
            } else {
                prop_assert_eq!(used.len(), 253);
            }
        }

        #[test]
        fn selection_is_deterministic(
            used_octets in proptest::collection::hash_set(2u8..=254, 0..64),
        ) {
            let ranges = [AddressRange::new("10.0.0", 2, 254)];
            let used: HashSet<String> =
                used_octets.iter().map(|o| format!("10.0.0.{o}")).collect();

            prop_assert_eq!(first_free(&ranges, &used), first_free(&ranges, &used));
        }
    }
}
