// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Speakers peering with a master router that sits behind a hub.
//!
//! The hub shares the external network with the nodes and a transit network with the master.
//! It forwards between the two; speakers and master reach each other through static routes
//! via the hub. The hub also peers with the master to prove the transit link.

use std::net::IpAddr;

use async_trait::async_trait;
use config::EnvConfig;
use config::model::{AddressPool, Advertisement, BgpPlan, Family, Peer};
use ipnet::IpNet;
use k8s_intf::{PodExec, Poll, command};
use observer::{Expect, Expectation, FrrPod};
use topology::{
    BgpNeighbor, ExternalFrrPod, HubBgpBuilder, MacvlanNad, MasterBgp, MasterBgpBuilder, NetworkAttachment,
    Render, Role, StaticRoute,
};
#[allow(unused)]
use tracing::{debug, info};

use super::common::{
    ADVERTISEMENT, EXTERNAL_NAD, MASTER_POD, PEER, POOL, Topology, apply_plan, deploy_workload,
    pool_aggregation, pool_cidr, require_cluster, sessions_up, suite_nodes,
};
use crate::context::ScenarioContext;
use crate::driver::{Cleanup, Scenario, Steps};
use crate::error::ScenarioError;
use crate::preconditions::ClusterFacts;

pub const HUB_POD: &str = "frr-hub";
pub const TRANSIT_NAD: &str = "transit";
/// ASN of the hub when it is not part of the MetalLB AS
pub const HUB_ASN: u32 = 64520;

/// Hub and master addresses on the transit network
fn transit(family: Family) -> Result<(IpNet, IpNet), ScenarioError> {
    let (hub, master) = match family {
        Family::Ipv4 => ("172.16.0.1/24", "172.16.0.2/24"),
        Family::Ipv6 => ("fd00:172:16::1/64", "fd00:172:16::2/64"),
    };
    let parse = |s: &str| s.parse::<IpNet>().map_err(|e| ScenarioError::Setup(e.to_string()));
    Ok((parse(hub)?, parse(master)?))
}

fn forwarding_sysctl(family: Family) -> &'static str {
    match family {
        Family::Ipv4 => "net.ipv4.ip_forward=1",
        Family::Ipv6 => "net.ipv6.conf.all.forwarding=1",
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiHop {
    pub family: Family,
    pub speakers: Vec<IpAddr>,
    /// hub address on the node network
    pub hub_external: IpNet,
    pub hub_transit: IpNet,
    pub master_transit: IpNet,
    pub master_asn: u32,
    pub hub_asn: u32,
    pub metallb_asn: u32,
}

impl MultiHop {
    /// The hub takes the second external address. With `ibgp` the master and the hub are
    /// in the MetalLB AS.
    pub fn new(env: &EnvConfig, facts: &ClusterFacts, family: Family, ibgp: bool) -> Result<Self, ScenarioError> {
        let single = Topology::single_hop(env, facts, family, ibgp, facts.workers.len())?;
        let external = env.require_external_ips(family == Family::Ipv6)?;
        let Some(hub_ip) = external.get(1) else {
            return Err(ScenarioError::Skip(format!("needs 2 {family} external addresses")));
        };
        let hub_external = IpNet::new(*hub_ip, family.subnet_prefix_len())
            .map_err(|e| ScenarioError::Setup(e.to_string()))?;
        let subnet = hub_external.trunc();
        if let Some(outside) = single.speakers.iter().find(|s| !subnet.contains(*s)) {
            return Err(ScenarioError::Setup(format!("speaker {outside} is not in {subnet} of the hub")));
        }
        let (hub_transit, master_transit) = transit(family)?;
        Ok(Self {
            family,
            speakers: single.speakers,
            hub_external,
            hub_transit,
            master_transit,
            master_asn: single.master_asn,
            hub_asn: if ibgp { single.master_asn } else { HUB_ASN },
            metallb_asn: single.metallb_asn,
        })
    }

    #[must_use]
    pub fn is_ibgp(&self) -> bool {
        self.master_asn == self.metallb_asn
    }

    /// Route of the speakers to the master and route of the master back to the nodes
    #[must_use]
    pub fn routes(&self) -> (StaticRoute, StaticRoute) {
        (
            StaticRoute::new(self.master_transit.trunc(), self.hub_external.addr()),
            StaticRoute::new(self.hub_external.trunc(), self.hub_transit.addr()),
        )
    }

    pub fn plan(&self) -> Result<BgpPlan, ScenarioError> {
        let aggregation = pool_aggregation(self.family);
        let advertisement = Advertisement::new(ADVERTISEMENT, POOL)
            .set_aggregation_length(
                (self.family == Family::Ipv4).then_some(aggregation),
                (self.family == Family::Ipv6).then_some(aggregation),
            )
            .set_node_selectors(Some(suite_nodes()));
        let peer = Peer::new(PEER, self.master_transit.addr(), self.metallb_asn, self.master_asn)
            .set_ebgp_multihop(!self.is_ibgp());
        let plan = BgpPlan::default()
            .add_pool(AddressPool::new(POOL, &[pool_cidr(self.family)])?)
            .add_advertisement(advertisement)
            .add_peer(peer);
        plan.validate()?;
        Ok(plan)
    }

    /// Master peering with every speaker across the hub, and with the hub itself
    pub fn master_bgp(&self) -> Result<MasterBgp, ScenarioError> {
        let mut neighbors: Vec<BgpNeighbor> = self.speakers.iter().map(|s| BgpNeighbor::new(*s)).collect();
        neighbors.push(BgpNeighbor::new(self.hub_transit.addr()).set_asn(self.hub_asn));
        Ok(MasterBgpBuilder::default()
            .local_asn(self.master_asn)
            .remote_asn(self.metallb_asn)
            .neighbors(neighbors)
            .ebgp_multihop(!self.is_ibgp())
            .build()?)
    }
}

pub struct MultiHopSessions {
    pub family: Family,
    pub ibgp: bool,
}

#[async_trait]
impl Scenario<ScenarioContext> for MultiHopSessions {
    fn name(&self) -> &'static str {
        match (self.family, self.ibgp) {
            (Family::Ipv4, false) => "multi-hop ebgp through a hub (ipv4)",
            (Family::Ipv6, false) => "multi-hop ebgp through a hub (ipv6)",
            (Family::Ipv4, true) => "multi-hop ibgp through a hub (ipv4)",
            (Family::Ipv6, true) => "multi-hop ibgp through a hub (ipv6)",
        }
    }

    async fn preconditions(&self, ctx: &ScenarioContext) -> Result<(), ScenarioError> {
        require_cluster(ctx.facts(), self.family, 1)?;
        ctx.env().require_external_interface()?;
        MultiHop::new(ctx.env(), ctx.facts(), self.family, self.ibgp)?;
        Ok(())
    }

    async fn run(&self, ctx: &mut ScenarioContext, steps: &mut Steps) -> Result<(), ScenarioError> {
        let hops = MultiHop::new(ctx.env(), ctx.facts(), self.family, self.ibgp)?;
        let node = ctx.facts().router_node()?.to_string();
        let interface = ctx.env().require_external_interface()?.to_string();
        let namespace = ctx.env().test_namespace.clone();
        let external = MacvlanNad::new(EXTERNAL_NAD, &interface, &namespace);
        let transit = MacvlanNad::new(TRANSIT_NAD, &interface, &namespace);

        let master_bgp = hops.master_bgp()?;
        let hub_bgp = HubBgpBuilder::default()
            .local_asn(hops.hub_asn)
            .upstream(BgpNeighbor::new(hops.master_transit.addr()).set_asn(hops.master_asn))
            .build()?;
        let hub = ExternalFrrPod::new(HUB_POD, Role::Hub, &node, &hub_bgp.render(&()))
            .add_interface(NetworkAttachment::new(&external, vec![hops.hub_external]))
            .add_interface(NetworkAttachment::new(&transit, vec![hops.hub_transit]));
        let master = ExternalFrrPod::new(MASTER_POD, Role::Master, &node, &master_bgp.render(&()))
            .add_interface(NetworkAttachment::new(&transit, vec![hops.master_transit]));

        steps.defer(Cleanup::Harness);
        let nads = [external, transit];
        let hub_pod = steps
            .setup("deploy hub", ctx.harness().deploy(&hub, &nads))
            .await?;
        let master_pod = steps
            .setup("deploy master behind the hub", ctx.harness().deploy(&master, &nads))
            .await?;
        let gw = ctx.gateway().clone();
        steps
            .setup(
                "enable forwarding on the hub",
                gw.exec(&hub_pod, &command(&["sysctl", "-w", forwarding_sysctl(self.family)])),
            )
            .await?;

        let (to_master, to_nodes) = hops.routes();
        let speakers = steps.setup("list speakers", ctx.speakers()).await?;
        steps
            .setup("route speakers to the master via the hub", ctx.harness().add_routes(&speakers, &[to_master]))
            .await?;
        steps
            .setup(
                "route the master back to the nodes via the hub",
                ctx.harness().add_routes(std::slice::from_ref(&master_pod), &[to_nodes]),
            )
            .await?;

        apply_plan(ctx, steps, &hops.plan()?).await?;
        deploy_workload(ctx, steps, self.family).await?;

        let cancel = ctx.cancel();
        let master = FrrPod::new(&gw, master_pod);
        let mut neighbors = hops.speakers.clone();
        neighbors.push(hops.hub_transit.addr());
        sessions_up(ctx, steps, &master, &neighbors).await?;
        let pool: IpNet = pool_cidr(self.family)
            .parse()
            .map_err(|e: ipnet::AddrParseError| ScenarioError::Setup(e.to_string()))?;
        steps
            .verify(
                "master learns the pool across the hub",
                &Expect::new(&master, Expectation::PrefixLearned(pool)),
                Poll::BGP,
                &cancel,
            )
            .await?;
        Ok(())
    }
}
