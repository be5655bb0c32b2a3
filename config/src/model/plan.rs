// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The set of MetalLB resources a scenario sets up, validated as a whole

use std::collections::BTreeSet;

#[allow(unused)]
use tracing::debug;

use crate::model::{Advertisement, AddressPool, BfdProfile, Peer};
use crate::{ConfigError, ConfigResult};

/// Pools, advertisements, peers and BFD profiles created together by a scenario.
/// The manager applies them in that order and removes them in reverse.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BgpPlan {
    pub pools: Vec<AddressPool>,
    pub advertisements: Vec<Advertisement>,
    pub peers: Vec<Peer>,
    pub bfd_profiles: Vec<BfdProfile>,
}

fn check_unique<'a>(kind: &'static str, names: impl Iterator<Item = &'a str>) -> ConfigResult {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateName(kind, name.to_owned()));
        }
    }
    Ok(())
}

impl BgpPlan {
    #[must_use]
    pub fn add_pool(mut self, pool: AddressPool) -> Self {
        self.pools.push(pool);
        self
    }

    #[must_use]
    pub fn add_advertisement(mut self, advertisement: Advertisement) -> Self {
        self.advertisements.push(advertisement);
        self
    }

    #[must_use]
    pub fn add_peer(mut self, peer: Peer) -> Self {
        self.peers.push(peer);
        self
    }

    #[must_use]
    pub fn add_bfd_profile(mut self, profile: BfdProfile) -> Self {
        self.bfd_profiles.push(profile);
        self
    }

    #[must_use]
    pub fn pool(&self, name: &str) -> Option<&AddressPool> {
        self.pools.iter().find(|p| p.name == name)
    }

    pub fn advertisement_mut(&mut self, name: &str) -> Option<&mut Advertisement> {
        self.advertisements.iter_mut().find(|a| a.name == name)
    }

    pub fn peer_mut(&mut self, name: &str) -> Option<&mut Peer> {
        self.peers.iter_mut().find(|p| p.name == name)
    }

    /// Names of the peers no advertisement applies to
    #[must_use]
    pub fn unadvertised_peers(&self) -> Vec<&str> {
        self.peers
            .iter()
            .filter(|p| !self.advertisements.iter().any(|a| a.selects_peer(&p.name)))
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Check the plan: unique names, valid non-overlapping pools, advertisements bound to
    /// existing pools and peers, and every peer either advertised to or marked unused.
    pub fn validate(&self) -> ConfigResult {
        check_unique("pool", self.pools.iter().map(|p| p.name.as_str()))?;
        check_unique(
            "advertisement",
            self.advertisements.iter().map(|a| a.name.as_str()),
        )?;
        check_unique("peer", self.peers.iter().map(|p| p.name.as_str()))?;
        check_unique(
            "bfd profile",
            self.bfd_profiles.iter().map(|b| b.name.as_str()),
        )?;

        for (i, pool) in self.pools.iter().enumerate() {
            pool.validate()?;
            pool.check_no_overlap(&self.pools[i + 1..])?;
        }

        for adv in &self.advertisements {
            let pool = self
                .pool(&adv.pool)
                .ok_or_else(|| ConfigError::UnknownPool(adv.name.clone(), adv.pool.clone()))?;
            adv.validate_against(pool)?;
            if let Some(unknown) = adv
                .peer_selectors
                .iter()
                .find(|name| !self.peers.iter().any(|p| &p.name == *name))
            {
                return Err(ConfigError::InvalidValue(
                    "advertisement peer selector",
                    format!("{}: no peer named {unknown}", adv.name),
                ));
            }
        }

        for peer in &self.peers {
            peer.validate()?;
            if let Some(profile) = &peer.bfd_profile {
                if !self.bfd_profiles.iter().any(|b| &b.name == profile) {
                    return Err(ConfigError::InvalidValue(
                        "peer bfd profile",
                        format!("{}: no profile named {profile}", peer.name),
                    ));
                }
            }
        }

        let unused: Vec<String> = self
            .unadvertised_peers()
            .into_iter()
            .filter(|name| self.peers.iter().any(|p| p.name == *name && !p.unused))
            .map(ToOwned::to_owned)
            .collect();
        if !unused.is_empty() {
            return Err(ConfigError::UnusedPeers(unused));
        }
        debug!(
            "Plan is valid: {} pools, {} advertisements, {} peers",
            self.pools.len(),
            self.advertisements.len(),
            self.peers.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::advertisement::NO_ADVERTISE;

    fn plan() -> BgpPlan {
        BgpPlan::default()
            .add_pool(AddressPool::new("p1", &["192.168.100.0/28"]).unwrap())
            .add_advertisement(
                Advertisement::new("adv1", "p1")
                    .add_community(NO_ADVERTISE)
                    .set_local_pref(Some(100))
                    .set_aggregation_length(Some(28), None),
            )
            .add_peer(Peer::new(
                "peer-one",
                "10.0.0.1".parse().unwrap(),
                64501,
                64500,
            ))
    }

    #[test]
    fn test_valid_plan() {
        assert_eq!(plan().validate(), Ok(()));
    }

    #[test]
    fn test_advertisement_needs_pool() {
        let plan = plan().add_advertisement(Advertisement::new("adv2", "nope"));
        assert_eq!(
            plan.validate(),
            Err(ConfigError::UnknownPool("adv2".into(), "nope".into()))
        );
    }

    #[test]
    fn test_unused_peer() {
        let plan = BgpPlan::default()
            .add_pool(AddressPool::new("p1", &["192.168.100.0/28"]).unwrap())
            .add_advertisement(Advertisement::new("adv1", "p1").add_peer("peer-one"))
            .add_peer(Peer::new("peer-one", "10.0.0.1".parse().unwrap(), 64501, 64500))
            .add_peer(Peer::new("peer-two", "10.0.0.2".parse().unwrap(), 64501, 64500));
        assert_eq!(
            plan.validate(),
            Err(ConfigError::UnusedPeers(vec!["peer-two".into()]))
        );

        let mut plan = plan;
        if let Some(p) = plan.peer_mut("peer-two") {
            p.unused = true;
        }
        assert_eq!(plan.validate(), Ok(()));
    }

    #[test]
    fn test_duplicates_and_overlaps() {
        let plan = plan().add_pool(AddressPool::new("p1", &["10.10.0.0/24"]).unwrap());
        assert_eq!(
            plan.validate(),
            Err(ConfigError::DuplicateName("pool", "p1".into()))
        );

        let plan = plan_with_overlap();
        assert!(matches!(
            plan.validate(),
            Err(ConfigError::OverlappingPools(..))
        ));
    }

    fn plan_with_overlap() -> BgpPlan {
        plan().add_pool(AddressPool::new("p2", &["192.168.100.8/29"]).unwrap())
    }
}
