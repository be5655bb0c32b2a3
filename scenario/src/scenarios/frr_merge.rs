// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! FRRConfigurations targeting the same neighbor: compatible ones merge, contradicting
//! ones are refused.

use std::net::IpAddr;

use async_trait::async_trait;
use config::model::{Family, FrrConfiguration, FrrConfigurationBuilder, FrrNeighbor, Receive, merge_frr_configurations};
use ipnet::IpNet;
use k8s_intf::Poll;
use observer::{Expect, Expectation, FrrPod};
#[allow(unused)]
use tracing::{debug, info};

use super::common::{Topology, deploy_master, require_cluster, sessions_up};
use crate::context::ScenarioContext;
use crate::driver::{Cleanup, Scenario, Steps};
use crate::error::ScenarioError;
use crate::preconditions::FRRCONFIGURATION_CRD;

/// ASN the contradicting configuration claims for the neighbor
pub const CONFLICTING_ASN: u32 = 64600;

/// Prefixes the master originates, each accepted by one of the two configurations
#[must_use]
pub fn merge_prefixes(family: Family) -> [&'static str; 2] {
    match family {
        Family::Ipv4 => ["192.168.100.0/24", "192.168.200.0/24"],
        Family::Ipv6 => ["2001:100::/64", "2001:200::/64"],
    }
}

/// Configuration of the speakers towards `neighbor` accepting only `accepted`
pub fn receive_only(
    name: &str,
    local_asn: u32,
    neighbor: IpAddr,
    remote_asn: u32,
    accepted: &[&str],
) -> Result<FrrConfiguration, ScenarioError> {
    Ok(FrrConfigurationBuilder::default()
        .name(name)
        .local_asn(local_asn)
        .neighbor(FrrNeighbor::new(neighbor, remote_asn))
        .receive(Receive::filtered(accepted)?)
        .build()?)
}

fn conflicting_asn(asn: u32) -> u32 {
    if asn == CONFLICTING_ASN { CONFLICTING_ASN + 100 } else { CONFLICTING_ASN }
}

/// Two configurations for the master, each accepting one prefix. Both prefixes end up
/// on every speaker.
pub struct MergeAccept {
    pub family: Family,
}

#[async_trait]
impl Scenario<ScenarioContext> for MergeAccept {
    fn name(&self) -> &'static str {
        match self.family {
            Family::Ipv4 => "frr configuration merge accepts (ipv4)",
            Family::Ipv6 => "frr configuration merge accepts (ipv6)",
        }
    }

    async fn preconditions(&self, ctx: &ScenarioContext) -> Result<(), ScenarioError> {
        require_cluster(ctx.facts(), self.family, 1)?;
        ctx.facts().require_crd(FRRCONFIGURATION_CRD)?;
        Topology::single_hop(ctx.env(), ctx.facts(), self.family, false, 1)?;
        Ok(())
    }

    async fn run(&self, ctx: &mut ScenarioContext, steps: &mut Steps) -> Result<(), ScenarioError> {
        let workers = ctx.facts().workers.len();
        let topology = Topology::single_hop(ctx.env(), ctx.facts(), self.family, false, workers)?;
        let [first, second] = merge_prefixes(self.family);
        let (mut v4, mut v6) = (vec![], vec![]);
        for prefix in [first, second] {
            match prefix.parse::<IpNet>() {
                Ok(IpNet::V4(net)) => v4.push(net),
                Ok(IpNet::V6(net)) => v6.push(net),
                Err(e) => return Err(ScenarioError::Setup(e.to_string())),
            }
        }
        let bgp = topology.master_bgp().advertised_v4(v4).advertised_v6(v6).build()?;

        let local_asn = ctx.env().metallb_asn;
        let a = receive_only("merge-a", local_asn, topology.master_ip(), topology.master_asn, &[first])?;
        let b = receive_only("merge-b", local_asn, topology.master_ip(), topology.master_asn, &[second])?;
        let merged = merge_frr_configurations([&a, &b])?;
        steps.ensure(
            "configurations merge into one neighbor",
            merged.len() == 1,
            format!("{} neighbors", merged.len()),
        )?;

        let master_pod = deploy_master(ctx, steps, &topology, &bgp).await?;
        steps.defer(Cleanup::Namespace);
        steps
            .setup("apply first configuration", ctx.manager().apply_frr_configuration(&a, false))
            .await?;
        steps
            .setup("apply second configuration", ctx.manager().apply_frr_configuration(&b, false))
            .await?;

        let gw = ctx.gateway().clone();
        let cancel = ctx.cancel();
        let master = FrrPod::new(&gw, master_pod);
        sessions_up(ctx, steps, &master, &topology.speakers).await?;
        let speakers = steps.setup("list speakers", ctx.speakers()).await?;
        for speaker in speakers {
            let speaker = FrrPod::new(&gw, speaker);
            let received = Expect::new(
                &speaker,
                Expectation::ReceivedRoutesContain(vec![first.to_string(), second.to_string()]),
            );
            steps
                .verify("speaker received both prefixes", &received, Poll::BGP, &cancel)
                .await?;
        }
        Ok(())
    }
}

/// A configuration claiming another ASN for a neighbor already configured is refused
pub struct MergeReject {
    pub family: Family,
}

#[async_trait]
impl Scenario<ScenarioContext> for MergeReject {
    fn name(&self) -> &'static str {
        match self.family {
            Family::Ipv4 => "frr configuration merge rejects (ipv4)",
            Family::Ipv6 => "frr configuration merge rejects (ipv6)",
        }
    }

    async fn preconditions(&self, ctx: &ScenarioContext) -> Result<(), ScenarioError> {
        ctx.facts().require_family(self.family)?;
        ctx.facts().require_crd(FRRCONFIGURATION_CRD)?;
        ctx.env().require_external_ips(self.family == Family::Ipv6)?;
        Ok(())
    }

    async fn run(&self, ctx: &mut ScenarioContext, steps: &mut Steps) -> Result<(), ScenarioError> {
        let env = ctx.env();
        let neighbor = env.require_external_ips(self.family == Family::Ipv6)?[0];
        let [first, second] = merge_prefixes(self.family);
        let a = receive_only("merge-a", env.metallb_asn, neighbor, env.external_asn, &[first])?;
        let b = receive_only(
            "merge-b",
            env.metallb_asn,
            neighbor,
            conflicting_asn(env.external_asn),
            &[second],
        )?;
        let local = merge_frr_configurations([&a, &b]);
        steps.ensure(
            "configurations contradict each other",
            local.is_err(),
            local.as_ref().map_or_else(ToString::to_string, |m| format!("{m:?}")),
        )?;

        steps.defer(Cleanup::Namespace);
        steps
            .setup("apply first configuration", ctx.manager().apply_frr_configuration(&a, false))
            .await?;
        steps
            .setup(
                "contradicting configuration is refused",
                ctx.manager().apply_frr_configuration(&b, true),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_compatible_configurations_merge() {
        let [first, second] = merge_prefixes(Family::Ipv4);
        let a = receive_only("merge-a", 64501, ip("10.46.81.10"), 64500, &[first]).unwrap();
        let b = receive_only("merge-b", 64501, ip("10.46.81.10"), 64500, &[second]).unwrap();
        let merged = merge_frr_configurations([&a, &b]).unwrap();
        assert_eq!(merged.len(), 1);
        assert!(merged[0].receive.accepts(&first.parse().unwrap()));
        assert!(merged[0].receive.accepts(&second.parse().unwrap()));
    }

    #[test]
    fn test_contradicting_configurations_fail() {
        let [first, second] = merge_prefixes(Family::Ipv6);
        let a = receive_only("merge-a", 64501, ip("2001:db8::10"), 64500, &[first]).unwrap();
        let b = receive_only("merge-b", 64501, ip("2001:db8::10"), conflicting_asn(64500), &[second]).unwrap();
        assert!(merge_frr_configurations([&a, &b]).is_err());
        assert_eq!(conflicting_asn(64600), 64700);
    }
}
