// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Path attributes of an aggregated pool prefix, as received by an iBGP external router

use std::collections::BTreeSet;

use async_trait::async_trait;
use config::model::Family;
use config::model::advertisement::NO_ADVERTISE;
use ipnet::IpNet;
use k8s_intf::Poll;
use observer::{Expect, Expectation, ExpectedAttributes, FrrPod, normalize_community};

use super::common::{
    ADVERTISEMENT, Topology, apply_plan, deploy_master, deploy_workload, pool_aggregation, pool_cidr,
    require_cluster, sessions_up,
};
use crate::context::ScenarioContext;
use crate::driver::{Scenario, Steps};
use crate::error::ScenarioError;

pub const INITIAL_LOCAL_PREF: u32 = 100;
pub const UPDATED_LOCAL_PREF: u32 = 200;
pub const CUSTOM_COMMUNITY: &str = "65001:200";

fn attributes(local_pref: u32, community: &str) -> ExpectedAttributes {
    ExpectedAttributes {
        local_pref: Some(local_pref),
        communities: BTreeSet::from([normalize_community(community)]),
        nexthop: None,
    }
}

fn prefix(family: Family) -> Result<IpNet, ScenarioError> {
    pool_cidr(family)
        .parse()
        .map_err(|e: ipnet::AddrParseError| ScenarioError::Setup(e.to_string()))
}

/// Announce the pool aggregated with NO_ADVERTISE and local preference 100 and check the
/// external router sees both on the prefix. With `update`, then switch to local preference
/// 200 and a custom community and check the same prefix follows.
pub struct AggregatedPrefix {
    pub family: Family,
    pub update: bool,
}

#[async_trait]
impl Scenario<ScenarioContext> for AggregatedPrefix {
    fn name(&self) -> &'static str {
        match (self.family, self.update) {
            (Family::Ipv4, false) => "aggregated prefix attributes (ipv4)",
            (Family::Ipv6, false) => "aggregated prefix attributes (ipv6)",
            (Family::Ipv4, true) => "update local preference and community (ipv4)",
            (Family::Ipv6, true) => "update local preference and community (ipv6)",
        }
    }

    async fn preconditions(&self, ctx: &ScenarioContext) -> Result<(), ScenarioError> {
        require_cluster(ctx.facts(), self.family, 1)?;
        Topology::single_hop(ctx.env(), ctx.facts(), self.family, true, 1)?;
        Ok(())
    }

    async fn run(&self, ctx: &mut ScenarioContext, steps: &mut Steps) -> Result<(), ScenarioError> {
        let workers = ctx.facts().workers.len();
        // local preference only travels over iBGP
        let topology = Topology::single_hop(ctx.env(), ctx.facts(), self.family, true, workers)?;
        let prefix = prefix(self.family)?;
        let aggregation = pool_aggregation(self.family);
        let mut plan = topology.plan()?;
        if let Some(adv) = plan.advertisement_mut(ADVERTISEMENT) {
            *adv = adv
                .clone()
                .set_aggregation_length(
                    (self.family == Family::Ipv4).then_some(aggregation),
                    (self.family == Family::Ipv6).then_some(aggregation),
                )
                .add_community(NO_ADVERTISE)
                .set_local_pref(Some(INITIAL_LOCAL_PREF));
        }

        let bgp = topology.master_bgp().build()?;
        let master_pod = deploy_master(ctx, steps, &topology, &bgp).await?;
        apply_plan(ctx, steps, &plan).await?;
        deploy_workload(ctx, steps, self.family).await?;

        let gw = ctx.gateway().clone();
        let cancel = ctx.cancel();
        let master = FrrPod::new(&gw, master_pod);
        sessions_up(ctx, steps, &master, &topology.speakers).await?;
        steps
            .verify(
                "aggregated prefix has no-advertise and local preference 100",
                &Expect::new(
                    &master,
                    Expectation::PrefixAttributes {
                        prefix,
                        expected: attributes(INITIAL_LOCAL_PREF, NO_ADVERTISE),
                    },
                ),
                Poll::BGP,
                &cancel,
            )
            .await?;
        if !self.update {
            return Ok(());
        }

        let Some(adv) = plan.advertisement_mut(ADVERTISEMENT) else {
            return Err(ScenarioError::Setup(format!("advertisement {ADVERTISEMENT} missing from plan")));
        };
        *adv = adv
            .clone()
            .set_communities([CUSTOM_COMMUNITY])
            .set_local_pref(Some(UPDATED_LOCAL_PREF));
        let updated = adv.clone();
        steps
            .setup(
                "update local preference and community",
                ctx.manager().apply_advertisement(&updated),
            )
            .await?;
        steps
            .verify(
                "routes carry the custom community",
                &Expect::new(
                    &master,
                    Expectation::HasCommunity {
                        family: self.family,
                        community: CUSTOM_COMMUNITY.to_string(),
                    },
                ),
                Poll::BGP,
                &cancel,
            )
            .await?;
        steps
            .verify(
                "aggregated prefix has the new attributes",
                &Expect::new(
                    &master,
                    Expectation::PrefixAttributes {
                        prefix,
                        expected: attributes(UPDATED_LOCAL_PREF, CUSTOM_COMMUNITY),
                    },
                ),
                Poll::BGP,
                &cancel,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_expected_attributes() {
        let expected = attributes(INITIAL_LOCAL_PREF, NO_ADVERTISE);
        assert_eq!(expected.communities, BTreeSet::from(["no-advertise".to_string()]));
        assert_eq!(
            attributes(UPDATED_LOCAL_PREF, CUSTOM_COMMUNITY).communities,
            BTreeSet::from([CUSTOM_COMMUNITY.to_string()])
        );
        assert_eq!(prefix(Family::Ipv6).unwrap().prefix_len(), 124);
    }
}
