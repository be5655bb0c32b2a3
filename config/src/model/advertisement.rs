// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! BGP advertisements

use std::collections::{BTreeMap, BTreeSet};

use crate::{ConfigError, ConfigResult};

use super::ipstack::Family;
use super::pool::AddressPool;

/// Well-known BGP communities, in the textual form FRR and MetalLB accept
pub const NO_ADVERTISE: &str = "65535:65282";
pub const NO_EXPORT: &str = "65535:65281";

/// Binds a pool to a set of peers. An advertisement without peer selectors applies
/// to every peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Advertisement {
    pub name: String,
    pub pool: String,
    pub communities: BTreeSet<String>,
    pub local_pref: Option<u32>,
    pub aggregation_length_v4: Option<u8>,
    pub aggregation_length_v6: Option<u8>,
    pub peer_selectors: BTreeSet<String>,
    pub node_selectors: Option<BTreeMap<String, String>>,
}

impl Advertisement {
    #[must_use]
    pub fn new(name: &str, pool: &str) -> Self {
        Self {
            name: name.to_owned(),
            pool: pool.to_owned(),
            communities: BTreeSet::new(),
            local_pref: None,
            aggregation_length_v4: None,
            aggregation_length_v6: None,
            peer_selectors: BTreeSet::new(),
            node_selectors: None,
        }
    }

    #[must_use]
    pub fn add_community(mut self, community: &str) -> Self {
        self.communities.insert(community.to_owned());
        self
    }

    #[must_use]
    pub fn set_communities<I, S>(mut self, communities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.communities = communities.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn set_local_pref(mut self, local_pref: Option<u32>) -> Self {
        self.local_pref = local_pref;
        self
    }

    #[must_use]
    pub fn set_aggregation_length(mut self, v4: Option<u8>, v6: Option<u8>) -> Self {
        self.aggregation_length_v4 = v4;
        self.aggregation_length_v6 = v6;
        self
    }

    #[must_use]
    pub fn add_peer(mut self, peer: &str) -> Self {
        self.peer_selectors.insert(peer.to_owned());
        self
    }

    #[must_use]
    pub fn set_node_selectors(mut self, labels: Option<BTreeMap<String, String>>) -> Self {
        self.node_selectors = labels;
        self
    }

    /// Tell if this advertisement applies to the peer named `peer`
    #[must_use]
    pub fn selects_peer(&self, peer: &str) -> bool {
        self.peer_selectors.is_empty() || self.peer_selectors.contains(peer)
    }

    /// Check the advertisement against the pool it refers to. Each aggregation
    /// length may not exceed the prefix length of any CIDR of its family in the pool.
    pub fn validate_against(&self, pool: &AddressPool) -> ConfigResult {
        if pool.name != self.pool {
            return Err(ConfigError::UnknownPool(self.name.clone(), self.pool.clone()));
        }
        for (family, length) in [
            (Family::Ipv4, self.aggregation_length_v4),
            (Family::Ipv6, self.aggregation_length_v6),
        ] {
            let Some(length) = length else {
                continue;
            };
            if length > family.host_prefix_len() {
                return Err(ConfigError::InvalidValue(
                    "aggregation length",
                    format!("{length} for {family}"),
                ));
            }
            if let Some(cidr) = pool.cidrs_of(family).find(|c| length > c.prefix_len()) {
                return Err(ConfigError::AggregationTooLong(
                    self.name.clone(),
                    length,
                    *cidr,
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregation_validation() {
        let pool = AddressPool::new("p1", &["192.168.100.0/28", "2001:100::/124"]).unwrap();

        let adv = Advertisement::new("a1", "p1").set_aggregation_length(Some(28), Some(124));
        assert!(adv.validate_against(&pool).is_ok());

        let adv = Advertisement::new("a1", "p1").set_aggregation_length(Some(24), None);
        assert!(adv.validate_against(&pool).is_ok());

        let adv = Advertisement::new("a1", "p1").set_aggregation_length(Some(30), None);
        assert!(matches!(
            adv.validate_against(&pool),
            Err(ConfigError::AggregationTooLong(_, 30, _))
        ));

        let adv = Advertisement::new("a1", "p1").set_aggregation_length(None, Some(129));
        assert!(matches!(
            adv.validate_against(&pool),
            Err(ConfigError::InvalidValue(..))
        ));
    }

    #[test]
    fn test_wrong_pool() {
        let pool = AddressPool::new("p2", &["192.168.100.0/28"]).unwrap();
        let adv = Advertisement::new("a1", "p1");
        assert_eq!(
            adv.validate_against(&pool),
            Err(ConfigError::UnknownPool("a1".into(), "p1".into()))
        );
    }

    #[test]
    fn test_peer_selection() {
        let all = Advertisement::new("a1", "p1");
        assert!(all.selects_peer("anything"));
        let one = Advertisement::new("a2", "p1").add_peer("peer-a");
        assert!(one.selects_peer("peer-a"));
        assert!(!one.selects_peer("peer-b"));
    }
}
