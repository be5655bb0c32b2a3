// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Address pools

use ipnet::IpNet;

use crate::{ConfigError, ConfigResult, parse_cidr};

use super::ipstack::Family;

/// A named, ordered set of CIDRs handed to `LoadBalancer` services.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressPool {
    pub name: String,
    pub cidrs: Vec<IpNet>,
    pub auto_assign: bool,
}

impl AddressPool {
    /// Build a pool from CIDR strings. The pool must not be empty.
    pub fn new(name: &str, cidrs: &[&str]) -> Result<Self, ConfigError> {
        let cidrs = cidrs
            .iter()
            .map(|c| parse_cidr(c))
            .collect::<Result<Vec<_>, _>>()?;
        let pool = Self {
            name: name.to_owned(),
            cidrs,
            auto_assign: true,
        };
        pool.validate()?;
        Ok(pool)
    }

    #[must_use]
    pub fn set_auto_assign(mut self, value: bool) -> Self {
        self.auto_assign = value;
        self
    }

    pub fn validate(&self) -> ConfigResult {
        if self.cidrs.is_empty() {
            return Err(ConfigError::EmptyPool(self.name.clone()));
        }
        Ok(())
    }

    /// CIDRs of the given family
    pub fn cidrs_of(&self, family: Family) -> impl Iterator<Item = &IpNet> {
        self.cidrs.iter().filter(move |c| match c {
            IpNet::V4(_) => family == Family::Ipv4,
            IpNet::V6(_) => family == Family::Ipv6,
        })
    }

    /// First pair of overlapping CIDRs between two pools, if any
    #[must_use]
    pub fn overlap(&self, other: &AddressPool) -> Option<(IpNet, IpNet)> {
        for mine in &self.cidrs {
            for theirs in &other.cidrs {
                if mine.contains(theirs) || theirs.contains(mine) {
                    return Some((*mine, *theirs));
                }
            }
        }
        None
    }

    /// Check this pool against `others`. A pool with the same name is the one being
    /// updated and is not a conflict.
    pub fn check_no_overlap<'a>(&self, others: impl IntoIterator<Item = &'a AddressPool>) -> ConfigResult {
        for other in others.into_iter().filter(|o| o.name != self.name) {
            if let Some((mine, theirs)) = self.overlap(other) {
                return Err(ConfigError::OverlappingPools(
                    self.name.clone(),
                    mine,
                    other.name.clone(),
                    theirs,
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
    fn test_empty_pool_rejected() {
        assert_eq!(
            AddressPool::new("p0", &[]),
            Err(ConfigError::EmptyPool("p0".into()))
        );
    }

    #[test]
    fn test_overlap() {
        let p1 = AddressPool::new("p1", &["192.168.100.0/28", "2001:100::0/124"]).unwrap();
        let p2 = AddressPool::new("p2", &["192.168.100.8/29"]).unwrap();
        let p3 = AddressPool::new("p3", &["192.168.100.16/28"]).unwrap();

        assert!(p1.overlap(&p2).is_some());
        assert!(p2.overlap(&p1).is_some());
        assert!(p1.overlap(&p3).is_none());

        assert!(p3.check_no_overlap([&p1, &p2]).is_ok());
        let err = p2.check_no_overlap([&p1, &p3]).unwrap_err();
        assert!(matches!(err, ConfigError::OverlappingPools(ref a, _, ref b, _) if a == "p2" && b == "p1"));
    }

    #[test]
    fn test_update_is_not_overlap() {
        let p1 = AddressPool::new("p1", &["192.168.100.0/28"]).unwrap();
        let p1_new = AddressPool::new("p1", &["192.168.100.0/27"]).unwrap();
        assert!(p1_new.check_no_overlap([&p1]).is_ok());
    }

    #[test]
    fn test_cidrs_of_family() {
        let pool = AddressPool::new("p1", &["192.168.100.0/28", "2001:100::0/124"]).unwrap();
        assert_eq!(pool.cidrs_of(Family::Ipv4).count(), 1);
        assert_eq!(
            pool.cidrs_of(Family::Ipv6).next().unwrap().to_string(),
            "2001:100::/124"
        );
    }
}
