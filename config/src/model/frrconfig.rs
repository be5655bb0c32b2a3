// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! FRR-K8s configurations and their merge semantics.
//!
//! Several `FRRConfiguration` objects may target the same neighbor. The cluster merges them:
//! accepted prefixes are unioned and any disagreement on the session parameters is a conflict.
//! [`merge_frr_configurations`] reproduces that merge so a scenario can tell in advance what a
//! speaker should end up receiving.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use derive_builder::Builder;
use ipnet::IpNet;
#[allow(unused)]
use tracing::{debug, warn};

use crate::model::peer::BGP_PORT;
use crate::{ConfigError, ConfigResult, parse_cidr};

/// What a speaker accepts from a neighbor
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Receive {
    AcceptAll,
    AcceptFiltered(BTreeSet<IpNet>),
}

impl Default for Receive {
    fn default() -> Self {
        Receive::AcceptFiltered(BTreeSet::new())
    }
}

impl Receive {
    pub fn filtered<S: AsRef<str>>(prefixes: &[S]) -> Result<Self, ConfigError> {
        let set = prefixes
            .iter()
            .map(|p| parse_cidr(p.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Receive::AcceptFiltered(set))
    }

    #[must_use]
    pub fn accepts(&self, prefix: &IpNet) -> bool {
        match self {
            Receive::AcceptAll => true,
            Receive::AcceptFiltered(set) => set.contains(prefix),
        }
    }

    /// Union of two receive policies. Accepting everything wins.
    #[must_use]
    pub fn union(&self, other: &Receive) -> Receive {
        match (self, other) {
            (Receive::AcceptAll, _) | (_, Receive::AcceptAll) => Receive::AcceptAll,
            (Receive::AcceptFiltered(a), Receive::AcceptFiltered(b)) => {
                Receive::AcceptFiltered(a.union(b).copied().collect())
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrrNeighbor {
    pub ip: IpAddr,
    pub remote_asn: u32,
    pub ebgp_multihop: bool,
    pub password: Option<String>,
    pub port: u16,
    pub disable_mp: bool,
}

impl FrrNeighbor {
    #[must_use]
    pub fn new(ip: IpAddr, remote_asn: u32) -> Self {
        Self {
            ip,
            remote_asn,
            ebgp_multihop: false,
            password: None,
            port: BGP_PORT,
            disable_mp: false,
        }
    }

    #[must_use]
    pub fn set_ebgp_multihop(mut self, value: bool) -> Self {
        self.ebgp_multihop = value;
        self
    }

    #[must_use]
    pub fn set_password(mut self, password: Option<&str>) -> Self {
        self.password = password.map(ToOwned::to_owned);
        self
    }

    #[must_use]
    pub fn set_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn set_disable_mp(mut self, value: bool) -> Self {
        self.disable_mp = value;
        self
    }
}

#[derive(Builder, Clone, Debug, PartialEq, Eq)]
#[builder(build_fn(validate = "Self::validate", error = "ConfigError"))]
pub struct FrrConfiguration {
    #[builder(setter(into))]
    pub name: String,
    /// Defaults to the FRR-K8s namespace of the suite
    #[builder(setter(into, strip_option), default)]
    pub namespace: Option<String>,
    pub local_asn: u32,
    pub neighbor: FrrNeighbor,
    #[builder(default)]
    pub receive: Receive,
    /// Prefixes the speaker originates towards the neighbor
    #[builder(default)]
    pub prefixes: Vec<IpNet>,
    #[builder(default)]
    pub labels: BTreeMap<String, String>,
    #[builder(default)]
    pub node_selector: BTreeMap<String, String>,
}

impl FrrConfigurationBuilder {
    fn validate(&self) -> ConfigResult {
        if let Some(name) = &self.name {
            if name.is_empty() {
                return Err(ConfigError::MissingParameter("frr configuration name"));
            }
        }
        if let Some(neighbor) = &self.neighbor {
            if neighbor.port == 0 {
                return Err(ConfigError::InvalidValue("neighbor port", "0".to_string()));
            }
        }
        Ok(())
    }

    /// Add a single label
    pub fn label(&mut self, key: &str, value: &str) -> &mut Self {
        self.labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_owned(), value.to_owned());
        self
    }
}

impl FrrConfiguration {
    #[must_use]
    pub fn is_ibgp(&self) -> bool {
        self.local_asn == self.neighbor.remote_asn
    }
}

/// The session towards one neighbor after all configurations have been merged
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedNeighbor {
    pub ip: IpAddr,
    pub local_asn: u32,
    pub remote_asn: u32,
    pub ebgp_multihop: bool,
    pub password: Option<String>,
    pub port: u16,
    pub disable_mp: bool,
    pub receive: Receive,
    /// names of the configurations that contributed
    pub sources: Vec<String>,
}

impl MergedNeighbor {
    fn from_config(config: &FrrConfiguration) -> Self {
        let n = &config.neighbor;
        Self {
            ip: n.ip,
            local_asn: config.local_asn,
            remote_asn: n.remote_asn,
            ebgp_multihop: n.ebgp_multihop,
            password: n.password.clone(),
            port: n.port,
            disable_mp: n.disable_mp,
            receive: config.receive.clone(),
            sources: vec![config.name.clone()],
        }
    }

    fn merge(&mut self, config: &FrrConfiguration) -> ConfigResult {
        let n = &config.neighbor;
        let conflict = |what: String| {
            Err(ConfigError::MergeConflict(
                self.ip,
                format!("{what} ({} vs {})", self.sources.join(","), config.name),
            ))
        };
        if self.remote_asn != n.remote_asn {
            return conflict(format!(
                "remote ASN {} differs from {}",
                n.remote_asn, self.remote_asn
            ));
        }
        if self.local_asn != config.local_asn {
            return conflict(format!(
                "local ASN {} differs from {}",
                config.local_asn, self.local_asn
            ));
        }
        if self.port != n.port {
            return conflict(format!("port {} differs from {}", n.port, self.port));
        }
        if self.ebgp_multihop != n.ebgp_multihop {
            return conflict("ebgp-multihop setting differs".to_string());
        }
        if self.password != n.password {
            return conflict("password differs".to_string());
        }
        self.disable_mp |= n.disable_mp;
        self.receive = self.receive.union(&config.receive);
        self.sources.push(config.name.clone());
        Ok(())
    }
}

/// Merge configurations the way FRR-K8s does. Neighbors are returned ordered by address.
pub fn merge_frr_configurations<'a, I>(configs: I) -> Result<Vec<MergedNeighbor>, ConfigError>
where
    I: IntoIterator<Item = &'a FrrConfiguration>,
{
    let mut merged: BTreeMap<IpAddr, MergedNeighbor> = BTreeMap::new();
    for config in configs {
        match merged.get_mut(&config.neighbor.ip) {
            Some(neighbor) => {
                if let Err(e) = neighbor.merge(config) {
                    warn!("{e}");
                    return Err(e);
                }
            }
            None => {
                merged.insert(config.neighbor.ip, MergedNeighbor::from_config(config));
            }
        }
    }
    debug!("Merged configurations into {} neighbors", merged.len());
    Ok(merged.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighbor() -> FrrNeighbor {
        FrrNeighbor::new("10.0.0.1".parse().unwrap(), 64500)
    }

    fn config(name: &str, neighbor: FrrNeighbor, receive: Receive) -> FrrConfiguration {
        FrrConfigurationBuilder::default()
            .name(name)
            .local_asn(64501)
            .neighbor(neighbor)
            .receive(receive)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder() {
        let cfg = FrrConfigurationBuilder::default()
            .name("ra-base")
            .local_asn(64501)
            .neighbor(neighbor().set_disable_mp(true))
            .label("routeadvertisement.k8s.ovn.org", "enabled")
            .build()
            .unwrap();
        assert_eq!(cfg.receive, Receive::default());
        assert_eq!(
            cfg.labels.get("routeadvertisement.k8s.ovn.org").map(String::as_str),
            Some("enabled")
        );
        assert!(!cfg.is_ibgp());

        let missing = FrrConfigurationBuilder::default().name("x").build();
        assert_eq!(missing, Err(ConfigError::MissingParameter("local_asn")));
    }

    #[test]
    fn test_merge_unions_prefixes() {
        let a = config("a", neighbor(), Receive::filtered(&["192.168.100.0/24"]).unwrap());
        let b = config("b", neighbor(), Receive::filtered(&["192.168.200.0/24"]).unwrap());
        let merged = merge_frr_configurations([&a, &b]).unwrap();
        assert_eq!(merged.len(), 1);
        let n = &merged[0];
        assert!(n.receive.accepts(&"192.168.100.0/24".parse().unwrap()));
        assert!(n.receive.accepts(&"192.168.200.0/24".parse().unwrap()));
        assert!(!n.receive.accepts(&"192.168.30.0/24".parse().unwrap()));
        assert_eq!(n.sources, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_merge_accept_all_wins() {
        let a = config("a", neighbor(), Receive::filtered(&["192.168.100.0/24"]).unwrap());
        let b = config("b", neighbor(), Receive::AcceptAll);
        let merged = merge_frr_configurations([&a, &b]).unwrap();
        assert_eq!(merged[0].receive, Receive::AcceptAll);
    }

    #[test]
    fn test_merge_conflicts() {
        let a = config("a", neighbor(), Receive::AcceptAll);
        let b = config(
            "b",
            FrrNeighbor::new("10.0.0.1".parse().unwrap(), 64600),
            Receive::AcceptAll,
        );
        assert!(matches!(
            merge_frr_configurations([&a, &b]),
            Err(ConfigError::MergeConflict(..))
        ));

        let c = config("c", neighbor().set_port(1790), Receive::AcceptAll);
        assert!(merge_frr_configurations([&a, &c]).is_err());

        let d = config("d", neighbor().set_ebgp_multihop(true), Receive::AcceptAll);
        assert!(merge_frr_configurations([&a, &d]).is_err());
    }

    #[test]
    fn test_distinct_neighbors_do_not_conflict() {
        let a = config("a", neighbor(), Receive::AcceptAll);
        let b = config(
            "b",
            FrrNeighbor::new("10.0.0.2".parse().unwrap(), 64600),
            Receive::AcceptAll,
        );
        let merged = merge_frr_configurations([&b, &a]).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].ip.to_string(), "10.0.0.1");
    }
}
