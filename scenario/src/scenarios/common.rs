// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Building blocks shared by the scenarios: the external master router next to the
//! cluster, the default pool, advertisement and peer, and the service using them.

use std::collections::BTreeMap;
use std::net::IpAddr;

use config::EnvConfig;
use config::model::{AddressPool, Advertisement, BgpPlan, Family, IpStack, Peer};
use ipnet::IpNet;
use k8s_intf::{PodRef, Poll};
use observer::{Expect, Expectation, FrrPod};
use topology::{BgpNeighbor, ExternalFrrPod, MacvlanNad, MasterBgp, MasterBgpBuilder, NetworkAttachment, Render, Role};

use crate::context::{SUITE_NODE_LABEL, ScenarioContext};
use crate::driver::{Cleanup, Steps};
use crate::error::ScenarioError;
use crate::preconditions::ClusterFacts;

pub const MASTER_POD: &str = "frr-master";
pub const EXTERNAL_NAD: &str = "external";
pub const POOL: &str = "p1";
pub const ADVERTISEMENT: &str = "adv1";
pub const PEER: &str = "master";
pub const WORKLOAD: &str = "lb-p1";

/// Address range of the default pool
#[must_use]
/// Node selector of the workers labeled for the suite
#[must_use]
pub fn suite_nodes() -> BTreeMap<String, String> {
    BTreeMap::from([(SUITE_NODE_LABEL.0.to_string(), SUITE_NODE_LABEL.1.to_string())])
}

pub fn pool_cidr(family: Family) -> &'static str {
    match family {
        Family::Ipv4 => "192.168.100.0/28",
        Family::Ipv6 => "2001:100::/124",
    }
}

/// Aggregation length announcing the default pool as a single prefix
#[must_use]
pub fn pool_aggregation(family: Family) -> u8 {
    match family {
        Family::Ipv4 => 28,
        Family::Ipv6 => 124,
    }
}

#[must_use]
pub fn stack_of(family: Family) -> IpStack {
    match family {
        Family::Ipv4 => IpStack::V4,
        Family::Ipv6 => IpStack::V6,
    }
}

/// Cluster checks of every scenario peering with the master router
pub fn require_cluster(facts: &ClusterFacts, family: Family, workers: usize) -> Result<(), ScenarioError> {
    facts.require_workers(workers)?;
    facts.require_family(family)?;
    facts.router_node()?;
    Ok(())
}

/// Master router on the external network, peering with the speakers of the first workers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
    pub family: Family,
    /// master address with the prefix length of the external network
    pub master: IpNet,
    /// address of each worker on the external network, in worker order
    pub speakers: Vec<IpAddr>,
    pub master_asn: u32,
    pub metallb_asn: u32,
}

impl Topology {
    /// With `ibgp` the master uses the ASN of MetalLB. A worker's speaker address is the
    /// configured node address the worker reports, or the configured address at its index.
    pub fn single_hop(
        env: &EnvConfig,
        facts: &ClusterFacts,
        family: Family,
        ibgp: bool,
        workers: usize,
    ) -> Result<Self, ScenarioError> {
        let v6 = family == Family::Ipv6;
        let master_ip = env.require_external_ips(v6)?[0];
        let configured = env.require_node_addresses(v6)?;
        let speakers: Vec<IpAddr> = facts
            .workers
            .iter()
            .take(workers)
            .enumerate()
            .filter_map(|(i, worker)| {
                configured
                    .iter()
                    .find(|a| worker.addresses.contains(a))
                    .or_else(|| configured.get(i))
                    .copied()
            })
            .collect();
        if speakers.len() < workers {
            return Err(ScenarioError::Skip(format!(
                "needs {workers} workers with {family} node addresses, found {}",
                speakers.len()
            )));
        }
        let master = IpNet::new(master_ip, family.subnet_prefix_len())
            .map_err(|e| ScenarioError::Setup(e.to_string()))?;
        Ok(Self {
            family,
            master,
            speakers,
            master_asn: if ibgp { env.metallb_asn } else { env.external_asn },
            metallb_asn: env.metallb_asn,
        })
    }

    #[must_use]
    pub fn master_ip(&self) -> IpAddr {
        self.master.addr()
    }

    /// Master configuration peering with every speaker
    #[must_use]
    pub fn master_bgp(&self) -> MasterBgpBuilder {
        let mut builder = MasterBgpBuilder::default();
        builder
            .local_asn(self.master_asn)
            .remote_asn(self.metallb_asn)
            .neighbors(self.speakers.iter().map(|s| BgpNeighbor::new(*s)).collect());
        builder
    }

    /// Pool, advertisement of the pool to every peer from the labeled workers, and the master
    /// as the only peer
    pub fn plan(&self) -> Result<BgpPlan, ScenarioError> {
        let pool = AddressPool::new(POOL, &[pool_cidr(self.family)])?;
        let peer = Peer::new(PEER, self.master_ip(), self.metallb_asn, self.master_asn);
        let plan = BgpPlan::default()
            .add_pool(pool)
            .add_advertisement(Advertisement::new(ADVERTISEMENT, POOL).set_node_selectors(Some(suite_nodes())))
            .add_peer(peer);
        plan.validate()?;
        Ok(plan)
    }
}

/// Deploy the master router on the first control plane node. Its teardown is registered first.
pub async fn deploy_master(
    ctx: &mut ScenarioContext,
    steps: &mut Steps,
    topology: &Topology,
    bgp: &MasterBgp,
) -> Result<PodRef, ScenarioError> {
    let node = ctx.facts().router_node()?.to_string();
    let interface = ctx.env().require_external_interface()?.to_string();
    let nad = MacvlanNad::new(EXTERNAL_NAD, &interface, &ctx.env().test_namespace);
    let pod = ExternalFrrPod::new(MASTER_POD, Role::Master, &node, &bgp.render(&()))
        .add_interface(NetworkAttachment::new(&nad, vec![topology.master]))
        .set_bfd(bgp.bfd);
    for speaker in &topology.speakers {
        pod.check_same_subnet(*speaker)?;
    }
    steps.defer(Cleanup::Harness);
    steps
        .setup("deploy external FRR master", ctx.harness().deploy(&pod, &[nad]))
        .await
}

pub async fn apply_plan(ctx: &ScenarioContext, steps: &mut Steps, plan: &BgpPlan) -> Result<(), ScenarioError> {
    steps.defer(Cleanup::Namespace);
    steps
        .setup("apply pools, advertisements and peers", ctx.manager().apply_plan(plan))
        .await
}

/// A service on the default pool, so that MetalLB has an address to announce
pub async fn deploy_workload(ctx: &ScenarioContext, steps: &mut Steps, family: Family) -> Result<(), ScenarioError> {
    steps.defer(Cleanup::Workloads);
    steps
        .setup(
            "create load balancer service",
            ctx.deploy_workload(WORKLOAD, POOL, stack_of(family)),
        )
        .await
}

/// Wait for every speaker to be established on `router`
pub async fn sessions_up(
    ctx: &ScenarioContext,
    steps: &mut Steps,
    router: &FrrPod<'_>,
    speakers: &[IpAddr],
) -> Result<(), ScenarioError> {
    let up = Expect::new(router, Expectation::SessionsUp(speakers.to_vec()));
    steps
        .verify("sessions with the speakers are established", &up, Poll::BGP, &ctx.cancel())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preconditions::NodeInfo;
    use pretty_assertions::assert_eq;

    fn facts() -> ClusterFacts {
        let worker = |name: &str, addr: &str| NodeInfo {
            name: name.to_string(),
            addresses: vec![addr.parse().unwrap()],
            pod_subnets: vec![],
        };
        ClusterFacts {
            workers: vec![worker("worker-0", "10.46.81.3"), worker("worker-1", "10.46.81.2"), worker("worker-2", "192.168.1.7")],
            ..Default::default()
        }
    }

    fn env() -> EnvConfig {
        let mut env = EnvConfig::defaults().unwrap();
        env.external_ips_v4 = vec!["10.46.81.10".parse().unwrap()];
        env.node_addresses_v4 = vec!["10.46.81.2".parse().unwrap(), "10.46.81.3".parse().unwrap()];
        env.metallb_asn = 64501;
        env.external_asn = 64500;
        env
    }

    #[test]
    fn test_single_hop() {
        let topology = Topology::single_hop(&env(), &facts(), Family::Ipv4, false, 2).unwrap();
        assert_eq!(topology.master, "10.46.81.10/24".parse::<IpNet>().unwrap());
        assert_eq!(topology.master_asn, 64500);
        // matched by the addresses the workers report, not by position
        assert_eq!(
            topology.speakers,
            vec!["10.46.81.3".parse::<IpAddr>().unwrap(), "10.46.81.2".parse().unwrap()]
        );

        let ibgp = Topology::single_hop(&env(), &facts(), Family::Ipv4, true, 1).unwrap();
        assert_eq!(ibgp.master_asn, 64501);
        assert_eq!(ibgp.speakers, vec!["10.46.81.3".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_single_hop_skips() {
        assert!(Topology::single_hop(&env(), &facts(), Family::Ipv4, false, 4).unwrap_err().is_skip());
        assert!(Topology::single_hop(&env(), &facts(), Family::Ipv6, false, 1).unwrap_err().is_skip());
    }

    #[test]
    fn test_plan() {
        let topology = Topology::single_hop(&env(), &facts(), Family::Ipv4, false, 2).unwrap();
        let plan = topology.plan().unwrap();
        assert_eq!(plan.pools[0].cidrs, vec!["192.168.100.0/28".parse::<IpNet>().unwrap()]);
        assert_eq!(plan.peers[0].peer_ip, topology.master_ip());
        assert_eq!(plan.peers[0].remote_asn, 64500);
        assert!(plan.advertisements[0].peer_selectors.is_empty());
        assert_eq!(
            plan.advertisements[0].node_selectors,
            Some(BTreeMap::from([("metallb-e2e/bgp-speaker".to_string(), "true".to_string())]))
        );
        let bgp = topology.master_bgp().build().unwrap();
        assert_eq!(bgp.neighbors.len(), 2);
        assert_eq!(bgp.remote_asn, 64501);
    }
}
