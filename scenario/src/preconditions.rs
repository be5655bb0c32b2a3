// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! What a scenario needs from the cluster, checked before it runs

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use config::EnvConfig;
use config::model::{Family, IpStack};
use ipnet::IpNet;
use k8s_intf::{Gateway, GatewayError, node_addresses};
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use serde::Deserialize;
#[allow(unused)]
use tracing::{debug, info, warn};

use crate::error::ScenarioError;

/// CRDs some scenario depends on
pub const BGPPEER_CRD: &str = "bgppeers.metallb.io";
pub const FRRCONFIGURATION_CRD: &str = "frrconfigurations.frrk8s.metallb.io";
pub const ROUTE_ADVERTISEMENTS_CRD: &str = "routeadvertisements.k8s.ovn.org";
const KNOWN_CRDS: [&str; 3] = [BGPPEER_CRD, FRRCONFIGURATION_CRD, ROUTE_ADVERTISEMENTS_CRD];

/// Node annotation where OVN-K publishes the pod subnets of a node
const NODE_SUBNETS_ANNOTATION: &str = "k8s.ovn.org/node-subnets";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    pub addresses: Vec<IpAddr>,
    pub pod_subnets: Vec<IpNet>,
}

/// What the scenarios need to know about the cluster, gathered once per suite
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterFacts {
    /// sorted by name
    pub workers: Vec<NodeInfo>,
    pub control_plane: Vec<NodeInfo>,
    pub stack: Option<IpStack>,
    pub crds: BTreeSet<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Subnets {
    One(String),
    Many(Vec<String>),
}

/// Pod subnets of the default network from the OVN-K annotation. Absent or unreadable
/// annotations yield nothing.
#[must_use]
pub fn pod_subnets(annotation: Option<&str>) -> Vec<IpNet> {
    let Some(raw) = annotation else {
        return vec![];
    };
    let Ok(map) = serde_json::from_str::<BTreeMap<String, Subnets>>(raw) else {
        warn!("Unreadable {NODE_SUBNETS_ANNOTATION} annotation: {raw}");
        return vec![];
    };
    let subnets = match map.get("default") {
        Some(Subnets::One(s)) => vec![s.clone()],
        Some(Subnets::Many(v)) => v.clone(),
        None => vec![],
    };
    subnets.iter().filter_map(|s| s.parse().ok()).collect()
}

fn node_info(node: &Node) -> NodeInfo {
    NodeInfo {
        name: node.name_any(),
        addresses: node_addresses(node),
        pod_subnets: pod_subnets(node.annotations().get(NODE_SUBNETS_ANNOTATION).map(String::as_str)),
    }
}

impl ClusterFacts {
    pub async fn gather(gw: &Gateway, env: &EnvConfig) -> Result<Self, GatewayError> {
        let mut workers: Vec<NodeInfo> = gw
            .list_nodes(&env.worker_label)
            .await?
            .iter()
            .map(node_info)
            .collect();
        workers.sort_by(|a, b| a.name.cmp(&b.name));
        let mut control_plane: Vec<NodeInfo> = gw
            .list_nodes(&env.control_plane_label)
            .await?
            .iter()
            .map(node_info)
            .collect();
        control_plane.sort_by(|a, b| a.name.cmp(&b.name));
        let stack = IpStack::from_addresses(workers.iter().flat_map(|w| &w.addresses));
        let mut crds = BTreeSet::new();
        for crd in KNOWN_CRDS {
            if gw.crd_exists(crd).await? {
                crds.insert(crd.to_string());
            }
        }
        let facts = Self {
            workers,
            control_plane,
            stack,
            crds,
        };
        info!(
            "Cluster: {} workers, {} control plane nodes, stack {:?}",
            facts.workers.len(),
            facts.control_plane.len(),
            facts.stack
        );
        Ok(facts)
    }

    /// Single node clusters run everything on one node, listed both as worker and control plane
    #[must_use]
    pub fn is_single_node(&self) -> bool {
        let names: BTreeSet<&str> = self
            .workers
            .iter()
            .chain(&self.control_plane)
            .map(|n| n.name.as_str())
            .collect();
        names.len() == 1
    }

    pub fn require_workers(&self, count: usize) -> Result<(), ScenarioError> {
        if self.workers.len() < count {
            return Err(ScenarioError::Skip(format!(
                "needs {count} worker nodes, cluster has {}",
                self.workers.len()
            )));
        }
        Ok(())
    }

    pub fn require_multi_node(&self) -> Result<(), ScenarioError> {
        if self.is_single_node() {
            return Err(ScenarioError::Skip("single node cluster".to_string()));
        }
        Ok(())
    }

    pub fn require_family(&self, family: Family) -> Result<(), ScenarioError> {
        match self.stack {
            Some(stack) if stack.supports(family) => Ok(()),
            stack => Err(ScenarioError::Skip(format!(
                "{family} is not supported by the cluster ({})",
                stack.map_or_else(|| "no addresses".to_string(), |s| s.to_string())
            ))),
        }
    }

    pub fn require_crd(&self, name: &str) -> Result<(), ScenarioError> {
        if self.crds.contains(name) {
            Ok(())
        } else {
            Err(ScenarioError::Skip(format!("CRD {name} is not installed")))
        }
    }

    /// First control plane node, where external routers are scheduled
    pub fn router_node(&self) -> Result<&str, ScenarioError> {
        self.control_plane
            .first()
            .map(|n| n.name.as_str())
            .ok_or_else(|| ScenarioError::Skip("no control plane node found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node(name: &str, addr: &str) -> NodeInfo {
        NodeInfo {
            name: name.to_string(),
            addresses: vec![addr.parse().unwrap()],
            pod_subnets: vec![],
        }
    }

    fn facts() -> ClusterFacts {
        ClusterFacts {
            workers: vec![node("worker-0", "10.46.81.2"), node("worker-1", "10.46.81.3")],
            control_plane: vec![node("master-0", "10.46.81.1")],
            stack: Some(IpStack::V4),
            crds: BTreeSet::from([BGPPEER_CRD.to_string()]),
        }
    }

    #[test]
    fn test_requirements() {
        let f = facts();
        assert!(f.require_workers(2).is_ok());
        assert!(f.require_workers(3).unwrap_err().is_skip());
        assert!(f.require_multi_node().is_ok());
        assert!(f.require_family(Family::Ipv4).is_ok());
        assert!(f.require_family(Family::Ipv6).unwrap_err().is_skip());
        assert!(f.require_crd(BGPPEER_CRD).is_ok());
        assert!(f.require_crd(ROUTE_ADVERTISEMENTS_CRD).unwrap_err().is_skip());
        assert_eq!(f.router_node().unwrap(), "master-0");
    }

    #[test]
    fn test_single_node() {
        let sno = ClusterFacts {
            workers: vec![node("sno", "10.46.81.2")],
            control_plane: vec![node("sno", "10.46.81.2")],
            ..Default::default()
        };
        assert!(sno.is_single_node());
        assert!(sno.require_multi_node().unwrap_err().is_skip());
    }

    #[test]
    fn test_pod_subnets() {
        assert_eq!(
            pod_subnets(Some(r#"{"default":["10.128.2.0/23","fd02:0:0:3::/64"]}"#)),
            vec![
                "10.128.2.0/23".parse::<IpNet>().unwrap(),
                "fd02:0:0:3::/64".parse().unwrap()
            ]
        );
        assert_eq!(
            pod_subnets(Some(r#"{"default":"10.128.0.0/23"}"#)),
            vec!["10.128.0.0/23".parse::<IpNet>().unwrap()]
        );
        assert!(pod_subnets(Some("garbage")).is_empty());
        assert!(pod_subnets(None).is_empty());
    }
}
