// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! IP families and stacks

use std::net::IpAddr;

use strum_macros::{Display, EnumString};

/// A single address family
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
pub enum Family {
    #[strum(serialize = "ipv4")]
    Ipv4,
    #[strum(serialize = "ipv6")]
    Ipv6,
}

impl Family {
    #[must_use]
    pub fn of(addr: &IpAddr) -> Self {
        if addr.is_ipv4() {
            Family::Ipv4
        } else {
            Family::Ipv6
        }
    }

    /// Prefix length of a single host
    #[must_use]
    pub fn host_prefix_len(self) -> u8 {
        match self {
            Family::Ipv4 => 32,
            Family::Ipv6 => 128,
        }
    }

    /// Prefix length used for the networks the suite builds (hub network, pools)
    #[must_use]
    pub fn subnet_prefix_len(self) -> u8 {
        match self {
            Family::Ipv4 => 24,
            Family::Ipv6 => 64,
        }
    }

    /// Multicast group used when a scenario needs one
    #[must_use]
    pub fn multicast_group(self) -> &'static str {
        match self {
            Family::Ipv4 => "239.100.100.250",
            Family::Ipv6 => "ff05::5:1",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
pub enum IpStack {
    #[strum(serialize = "ipv4")]
    V4,
    #[strum(serialize = "ipv6")]
    V6,
    #[strum(serialize = "dual")]
    Dual,
}

impl IpStack {
    /// Stack formed by a set of addresses. `None` if the set is empty.
    pub fn from_addresses<'a>(addrs: impl IntoIterator<Item = &'a IpAddr>) -> Option<Self> {
        let (mut v4, mut v6) = (false, false);
        for a in addrs {
            if a.is_ipv4() {
                v4 = true;
            } else {
                v6 = true;
            }
        }
        match (v4, v6) {
            (true, true) => Some(IpStack::Dual),
            (true, false) => Some(IpStack::V4),
            (false, true) => Some(IpStack::V6),
            (false, false) => None,
        }
    }

    #[must_use]
    pub fn families(self) -> &'static [Family] {
        match self {
            IpStack::V4 => &[Family::Ipv4],
            IpStack::V6 => &[Family::Ipv6],
            IpStack::Dual => &[Family::Ipv4, Family::Ipv6],
        }
    }

    #[must_use]
    pub fn supports(self, family: Family) -> bool {
        self.families().contains(&family)
    }

    /// Addresses of `addrs` usable with this stack
    #[must_use]
    pub fn select(self, addrs: &[IpAddr]) -> Vec<IpAddr> {
        addrs
            .iter()
            .filter(|a| self.supports(Family::of(a)))
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_stack_from_addresses() {
        assert_eq!(IpStack::from_addresses(&Vec::<IpAddr>::new()), None);
        assert_eq!(
            IpStack::from_addresses(&[ip("10.0.0.1")]),
            Some(IpStack::V4)
        );
        assert_eq!(
            IpStack::from_addresses(&[ip("10.0.0.1"), ip("2001:db8::1")]),
            Some(IpStack::Dual)
        );
    }

    #[test]
    fn test_select() {
        let addrs = [ip("10.0.0.1"), ip("2001:db8::1"), ip("10.0.0.2")];
        assert_eq!(IpStack::V4.select(&addrs), vec![ip("10.0.0.1"), ip("10.0.0.2")]);
        assert_eq!(IpStack::V6.select(&addrs), vec![ip("2001:db8::1")]);
        assert_eq!(IpStack::Dual.select(&addrs).len(), 3);
    }

    #[test]
    fn test_family_strings() {
        assert_eq!(Family::Ipv6.to_string(), "ipv6");
        assert_eq!("ipv4".parse::<Family>().unwrap(), Family::Ipv4);
        assert_eq!("dual".parse::<IpStack>().unwrap(), IpStack::Dual);
        assert_eq!(Family::Ipv4.subnet_prefix_len(), 24);
    }
}
