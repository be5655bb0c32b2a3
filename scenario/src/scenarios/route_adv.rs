// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! OVN-K route advertisements: once accepted, the pod network of every node reaches the
//! external router through the selected FRR configuration.

use std::collections::BTreeMap;

use async_trait::async_trait;
use config::model::{Family, FrrConfigurationBuilder, FrrNeighbor, Receive, RouteAdvertisementBuilder};
use ipnet::IpNet;
use k8s_intf::Poll;
use k8s_types::ovn::{RA_LABEL_KEY, RA_LABEL_VALUE};
use observer::{Expect, Expectation, FrrPod};

use super::common::{Topology, deploy_master, require_cluster, sessions_up};
use crate::context::ScenarioContext;
use crate::driver::{Cleanup, Scenario, Steps};
use crate::error::ScenarioError;
use crate::preconditions::{ClusterFacts, FRRCONFIGURATION_CRD, ROUTE_ADVERTISEMENTS_CRD};

pub const ROUTE_ADVERTISEMENT: &str = "default-pod-network";
pub const FRR_CONFIGURATION: &str = "route-advertisement";

/// Pod subnets of the workers in `family`
#[must_use]
pub fn pod_subnets(facts: &ClusterFacts, family: Family) -> Vec<IpNet> {
    facts
        .workers
        .iter()
        .flat_map(|w| &w.pod_subnets)
        .filter(|net| Family::of(&net.addr()) == family)
        .copied()
        .collect()
}

pub struct PodNetworkAdvertisement {
    pub family: Family,
}

#[async_trait]
impl Scenario<ScenarioContext> for PodNetworkAdvertisement {
    fn name(&self) -> &'static str {
        match self.family {
            Family::Ipv4 => "ovn-k route advertisement of the pod network (ipv4)",
            Family::Ipv6 => "ovn-k route advertisement of the pod network (ipv6)",
        }
    }

    async fn preconditions(&self, ctx: &ScenarioContext) -> Result<(), ScenarioError> {
        let facts = ctx.facts();
        require_cluster(facts, self.family, 1)?;
        facts.require_crd(ROUTE_ADVERTISEMENTS_CRD)?;
        facts.require_crd(FRRCONFIGURATION_CRD)?;
        if pod_subnets(facts, self.family).is_empty() {
            return Err(ScenarioError::Skip(format!("no {} pod subnets published by OVN-K", self.family)));
        }
        Topology::single_hop(ctx.env(), facts, self.family, false, facts.workers.len())?;
        Ok(())
    }

    async fn run(&self, ctx: &mut ScenarioContext, steps: &mut Steps) -> Result<(), ScenarioError> {
        let workers = ctx.facts().workers.len();
        let topology = Topology::single_hop(ctx.env(), ctx.facts(), self.family, false, workers)?;
        let subnets = pod_subnets(ctx.facts(), self.family);
        let bgp = topology.master_bgp().build()?;

        let config = FrrConfigurationBuilder::default()
            .name(FRR_CONFIGURATION)
            .local_asn(topology.metallb_asn)
            .neighbor(FrrNeighbor::new(topology.master_ip(), topology.master_asn).set_disable_mp(true))
            .receive(Receive::AcceptAll)
            .label(RA_LABEL_KEY, RA_LABEL_VALUE)
            .build()?;
        let advertisement = RouteAdvertisementBuilder::default()
            .name(ROUTE_ADVERTISEMENT)
            .frr_configuration_selector(BTreeMap::from([(
                RA_LABEL_KEY.to_string(),
                RA_LABEL_VALUE.to_string(),
            )]))
            .build()?;

        let master_pod = deploy_master(ctx, steps, &topology, &bgp).await?;
        steps.defer(Cleanup::Namespace);
        steps
            .setup(
                "apply labeled FRR configuration",
                ctx.manager().apply_frr_configuration(&config, false),
            )
            .await?;

        let gw = ctx.gateway().clone();
        let cancel = ctx.cancel();
        let master = FrrPod::new(&gw, master_pod);
        sessions_up(ctx, steps, &master, &topology.speakers).await?;

        steps.defer(Cleanup::RouteAdvertisement(ROUTE_ADVERTISEMENT.to_string()));
        steps
            .setup(
                "route advertisement is accepted",
                ctx.manager().apply_route_advertisement(&advertisement),
            )
            .await?;
        for subnet in subnets {
            steps
                .verify(
                    "pod network is learned by the external router",
                    &Expect::new(&master, Expectation::PrefixLearned(subnet)),
                    Poll::BGP,
                    &cancel,
                )
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preconditions::NodeInfo;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pod_subnets() {
        let facts = ClusterFacts {
            workers: vec![
                NodeInfo {
                    name: "worker-0".to_string(),
                    addresses: vec![],
                    pod_subnets: vec!["10.128.2.0/23".parse().unwrap(), "fd02:0:0:3::/64".parse().unwrap()],
                },
                NodeInfo {
                    name: "worker-1".to_string(),
                    addresses: vec![],
                    pod_subnets: vec!["10.131.0.0/23".parse().unwrap()],
                },
            ],
            ..Default::default()
        };
        assert_eq!(
            pod_subnets(&facts, Family::Ipv4),
            vec!["10.128.2.0/23".parse::<IpNet>().unwrap(), "10.131.0.0/23".parse().unwrap()]
        );
        assert_eq!(pod_subnets(&facts, Family::Ipv6).len(), 1);
    }
}
