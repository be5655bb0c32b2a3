// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Config renderer: `frr.conf` of the master and hub routers.
//!
//! The master router is the far end of every topology. It originates the prefixes given to it
//! (each backed by a blackhole static route) and peers with the speakers, possibly across the
//! hub. The hub sits next to the cluster nodes and reflects routes between the master and the
//! speakers.

use std::net::{IpAddr, Ipv4Addr};

use config::model::Family;
use derive_builder::Builder;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};

use crate::TopologyError;
use crate::renderer::bfd::BfdPeer;
use crate::renderer::builder::{ConfigBuilder, MARKER, Render};

/// Hop limit for multi-hop eBGP sessions: speaker, hub, master
pub const EBGP_MULTIHOP_TTL: u8 = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BgpNeighbor {
    pub ip: IpAddr,
    /// falls back to the remote ASN of the router when unset
    pub asn: Option<u32>,
    pub source: Option<IpAddr>,
}

impl BgpNeighbor {
    #[must_use]
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            asn: None,
            source: None,
        }
    }

    #[must_use]
    pub fn set_asn(mut self, asn: u32) -> Self {
        self.asn = Some(asn);
        self
    }

    #[must_use]
    pub fn set_source(mut self, source: Option<IpAddr>) -> Self {
        self.source = source;
        self
    }
}

#[derive(Builder, Clone, Debug, PartialEq, Eq)]
#[builder(build_fn(validate = "Self::validate", error = "TopologyError"))]
pub struct MasterBgp {
    pub local_asn: u32,
    pub remote_asn: u32,
    #[builder(setter(strip_option), default)]
    pub router_id: Option<Ipv4Addr>,
    pub neighbors: Vec<BgpNeighbor>,
    #[builder(default)]
    pub advertised_v4: Vec<Ipv4Net>,
    #[builder(default)]
    pub advertised_v6: Vec<Ipv6Net>,
    #[builder(default)]
    pub ebgp_multihop: bool,
    #[builder(default)]
    pub bfd: bool,
    #[builder(setter(into, strip_option), default)]
    pub password: Option<String>,
    /// activate every neighbor in both address families
    #[builder(default)]
    pub multiprotocol: bool,
}

impl MasterBgpBuilder {
    fn validate(&self) -> Result<(), TopologyError> {
        match &self.neighbors {
            Some(n) if n.is_empty() => Err(TopologyError::Invalid(
                "master router needs at least one neighbor".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Builder, Clone, Debug, PartialEq, Eq)]
#[builder(build_fn(error = "TopologyError"))]
pub struct HubBgp {
    pub local_asn: u32,
    pub upstream: BgpNeighbor,
    #[builder(default)]
    pub downstream: Vec<BgpNeighbor>,
    #[builder(default)]
    pub bfd: bool,
}

/// Session settings shared by every neighbor statement of a router
struct NeighborCtx<'a> {
    local_asn: u32,
    default_asn: u32,
    ebgp_multihop: bool,
    bfd: bool,
    password: Option<&'a str>,
}

fn render_neighbor(n: &BgpNeighbor, ctx: &NeighborCtx<'_>) -> ConfigBuilder {
    let mut cfg = ConfigBuilder::new();
    let asn = n.asn.unwrap_or(ctx.default_asn);
    let ibgp = asn == ctx.local_asn;
    if ibgp {
        cfg += format!(" neighbor {} remote-as internal", n.ip);
    } else {
        cfg += format!(" neighbor {} remote-as {asn}", n.ip);
        if ctx.ebgp_multihop {
            cfg += format!(" neighbor {} ebgp-multihop {EBGP_MULTIHOP_TTL}", n.ip);
        }
    }
    if let Some(password) = ctx.password {
        cfg += format!(" neighbor {} password {password}", n.ip);
    }
    if ctx.bfd {
        cfg += format!(" neighbor {} bfd", n.ip);
    }
    if let Some(source) = n.source {
        cfg += format!(" neighbor {} update-source {source}", n.ip);
    }
    cfg
}

fn render_static_routes(v4: &[Ipv4Net], v6: &[Ipv6Net]) -> ConfigBuilder {
    let mut cfg = ConfigBuilder::new();
    for p in v4 {
        cfg += format!("ip route {p} blackhole");
    }
    for p in v6 {
        cfg += format!("ipv6 route {p} blackhole");
    }
    if !cfg.is_empty() {
        cfg += MARKER;
    }
    cfg
}

struct AddressFamily<'a> {
    family: Family,
    networks: Vec<IpNet>,
    activate: Vec<&'a BgpNeighbor>,
    reflect: bool,
    ibgp: Vec<&'a BgpNeighbor>,
}

impl AddressFamily<'_> {
    fn render(&self) -> ConfigBuilder {
        let mut cfg = ConfigBuilder::new();
        if self.networks.is_empty() && self.activate.is_empty() {
            return cfg;
        }
        cfg += MARKER;
        cfg += format!(" address-family {} unicast", self.family);
        for net in &self.networks {
            cfg += format!("  network {net}");
        }
        for n in &self.activate {
            cfg += format!("  neighbor {} activate", n.ip);
        }
        if self.reflect {
            for n in &self.ibgp {
                cfg += format!("  neighbor {} route-reflector-client", n.ip);
                cfg += format!("  neighbor {} next-hop-self", n.ip);
            }
        }
        cfg += " exit-address-family";
        cfg
    }
}

fn router_header(local_asn: u32, router_id: Option<Ipv4Addr>) -> ConfigBuilder {
    let mut cfg = ConfigBuilder::new();
    cfg += MARKER;
    cfg += format!("router bgp {local_asn}");
    if let Some(id) = router_id {
        cfg += format!(" bgp router-id {id}");
    }
    cfg += " no bgp ebgp-requires-policy";
    cfg += " no bgp network import-check";
    cfg += " no bgp default ipv4-unicast";
    cfg
}

fn preamble(hostname: &str) -> ConfigBuilder {
    let mut cfg = ConfigBuilder::new();
    cfg += "frr defaults traditional";
    cfg += format!("hostname {hostname}");
    cfg += "log stdout informational";
    cfg += MARKER;
    cfg
}

fn trailer() -> ConfigBuilder {
    let mut cfg = ConfigBuilder::new();
    cfg += MARKER;
    cfg += "line vty";
    cfg += MARKER;
    cfg
}

impl Render for MasterBgp {
    type Context = ();
    type Output = ConfigBuilder;

    fn render(&self, (): &Self::Context) -> Self::Output {
        let mut cfg = preamble("master");
        cfg += render_static_routes(&self.advertised_v4, &self.advertised_v6);
        cfg += router_header(self.local_asn, self.router_id);

        let ctx = NeighborCtx {
            local_asn: self.local_asn,
            default_asn: self.remote_asn,
            ebgp_multihop: self.ebgp_multihop,
            bfd: self.bfd,
            password: self.password.as_deref(),
        };
        for n in &self.neighbors {
            cfg += render_neighbor(n, &ctx);
        }

        for family in [Family::Ipv4, Family::Ipv6] {
            let networks: Vec<IpNet> = match family {
                Family::Ipv4 => self.advertised_v4.iter().copied().map(IpNet::V4).collect(),
                Family::Ipv6 => self.advertised_v6.iter().copied().map(IpNet::V6).collect(),
            };
            let activate = self
                .neighbors
                .iter()
                .filter(|n| self.multiprotocol || Family::of(&n.ip) == family)
                .collect();
            cfg += AddressFamily {
                family,
                networks,
                activate,
                reflect: false,
                ibgp: vec![],
            }
            .render();
        }
        cfg += "exit";

        if self.bfd {
            let peers: Vec<BfdPeer> = self
                .neighbors
                .iter()
                .map(|n| BfdPeer {
                    address: n.ip,
                    multihop: self.ebgp_multihop,
                    source: n.source,
                })
                .collect();
            cfg += peers.render(&());
        }
        cfg += trailer();
        cfg
    }
}

impl Render for HubBgp {
    type Context = ();
    type Output = ConfigBuilder;

    fn render(&self, (): &Self::Context) -> Self::Output {
        let mut cfg = preamble("hub");
        cfg += router_header(self.local_asn, None);

        let ctx = NeighborCtx {
            local_asn: self.local_asn,
            default_asn: self.local_asn,
            ebgp_multihop: false,
            bfd: self.bfd,
            password: None,
        };
        let all: Vec<&BgpNeighbor> = std::iter::once(&self.upstream)
            .chain(self.downstream.iter())
            .collect();
        for n in &all {
            cfg += render_neighbor(n, &ctx);
        }

        for family in [Family::Ipv4, Family::Ipv6] {
            let activate: Vec<&BgpNeighbor> = all
                .iter()
                .copied()
                .filter(|n| Family::of(&n.ip) == family)
                .collect();
            let ibgp = self
                .downstream
                .iter()
                .filter(|n| Family::of(&n.ip) == family)
                .filter(|n| n.asn.unwrap_or(self.local_asn) == self.local_asn)
                .collect();
            cfg += AddressFamily {
                family,
                networks: vec![],
                activate,
                reflect: true,
                ibgp,
            }
            .render();
        }
        cfg += "exit";

        if self.bfd {
            let peers: Vec<BfdPeer> = all
                .iter()
                .map(|n| BfdPeer {
                    address: n.ip,
                    multihop: false,
                    source: None,
                })
                .collect();
            cfg += peers.render(&());
        }
        cfg += trailer();
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_master_single_hop() {
        let master = MasterBgpBuilder::default()
            .local_asn(64500)
            .remote_asn(64501)
            .neighbors(vec![
                BgpNeighbor::new("10.0.0.2".parse().unwrap()),
                BgpNeighbor::new("10.0.0.3".parse().unwrap()),
            ])
            .advertised_v4(vec!["192.168.10.0/24".parse().unwrap()])
            .build()
            .unwrap();
        let expected = "\
frr defaults traditional
hostname master
log stdout informational
!
ip route 192.168.10.0/24 blackhole
!
router bgp 64500
 no bgp ebgp-requires-policy
 no bgp network import-check
 no bgp default ipv4-unicast
 neighbor 10.0.0.2 remote-as 64501
 neighbor 10.0.0.3 remote-as 64501
!
 address-family ipv4 unicast
  network 192.168.10.0/24
  neighbor 10.0.0.2 activate
  neighbor 10.0.0.3 activate
 exit-address-family
exit
!
line vty
!
";
        assert_eq!(master.render(&()).to_string(), expected);
    }

    #[test]
    fn test_master_multihop_bfd_dual_stack() {
        let master = MasterBgpBuilder::default()
            .local_asn(64500)
            .remote_asn(64501)
            .neighbors(vec![
                BgpNeighbor::new("10.0.1.2".parse().unwrap())
                    .set_source(Some("10.0.2.1".parse().unwrap())),
                BgpNeighbor::new("fd00:1::2".parse().unwrap()),
            ])
            .advertised_v6(vec!["2001:db8::/64".parse().unwrap()])
            .ebgp_multihop(true)
            .bfd(true)
            .password("secret")
            .build()
            .unwrap();
        let text = master.render(&()).to_string();
        assert!(text.contains(" neighbor 10.0.1.2 ebgp-multihop 2\n"));
        assert!(text.contains(" neighbor 10.0.1.2 update-source 10.0.2.1\n"));
        assert!(text.contains(" neighbor 10.0.1.2 password secret\n"));
        assert!(text.contains(" neighbor fd00:1::2 bfd\n"));
        assert!(text.contains("ipv6 route 2001:db8::/64 blackhole\n"));
        assert!(text.contains(
            " address-family ipv6 unicast\n  network 2001:db8::/64\n  neighbor fd00:1::2 activate\n"
        ));
        assert!(text.contains(" peer 10.0.1.2 multihop local-address 10.0.2.1\n"));
        // identical input, identical output
        assert_eq!(text, master.render(&()).to_string());
    }

    #[test]
    fn test_master_ibgp_has_no_multihop() {
        let master = MasterBgpBuilder::default()
            .local_asn(64500)
            .remote_asn(64500)
            .neighbors(vec![BgpNeighbor::new("10.0.0.2".parse().unwrap())])
            .ebgp_multihop(true)
            .build()
            .unwrap();
        let text = master.render(&()).to_string();
        assert!(text.contains(" neighbor 10.0.0.2 remote-as internal\n"));
        assert!(!text.contains("ebgp-multihop"));
        // only the hub reflects
        assert!(!text.contains("route-reflector-client"));
    }

    #[test]
    fn test_master_requires_neighbors() {
        let master = MasterBgpBuilder::default()
            .local_asn(64500)
            .remote_asn(64501)
            .neighbors(vec![])
            .build();
        assert!(matches!(master, Err(TopologyError::Invalid(_))));
    }

    #[test]
    fn test_hub() {
        let hub = HubBgpBuilder::default()
            .local_asn(64500)
            .upstream(BgpNeighbor::new("10.0.2.1".parse().unwrap()).set_asn(64600))
            .downstream(vec![
                BgpNeighbor::new("10.0.1.2".parse().unwrap()),
                BgpNeighbor::new("10.0.1.3".parse().unwrap()),
            ])
            .build()
            .unwrap();
        let expected = "\
frr defaults traditional
hostname hub
log stdout informational
!
router bgp 64500
 no bgp ebgp-requires-policy
 no bgp network import-check
 no bgp default ipv4-unicast
 neighbor 10.0.2.1 remote-as 64600
 neighbor 10.0.1.2 remote-as internal
 neighbor 10.0.1.3 remote-as internal
!
 address-family ipv4 unicast
  neighbor 10.0.2.1 activate
  neighbor 10.0.1.2 activate
  neighbor 10.0.1.3 activate
  neighbor 10.0.1.2 route-reflector-client
  neighbor 10.0.1.2 next-hop-self
  neighbor 10.0.1.3 route-reflector-client
  neighbor 10.0.1.3 next-hop-self
 exit-address-family
exit
!
line vty
!
";
        assert_eq!(hub.render(&()).to_string(), expected);
    }
}
