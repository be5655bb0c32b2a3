// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Reading what the operators report back

use std::collections::BTreeMap;
use std::net::IpAddr;

use config::model::{FrrConfiguration, Receive};
use k8s_types::frrk8s::FRRNodeState;
use k8s_types::metallb::BGPSessionState;
use kube::ResourceExt;

const ESTABLISHED: &str = "Established";

/// Sessions reported for the peer at `peer_ip` are all established. `None` while no speaker
/// reports a session with it.
#[must_use]
pub fn peer_established(states: &[BGPSessionState], peer_ip: IpAddr) -> Option<bool> {
    let peer = peer_ip.to_string();
    let mut statuses = states
        .iter()
        .filter_map(|s| s.status.as_ref())
        .filter(|s| s.peer.as_deref() == Some(peer.as_str()))
        .peekable();
    statuses.peek()?;
    Some(statuses.all(|s| s.bgp_status.as_deref() == Some(ESTABLISHED)))
}

/// Text a node's running configuration contains once `config` is part of it: the neighbor
/// with its ASN, every accepted prefix and every originated prefix
#[must_use]
pub fn running_config_markers(config: &FrrConfiguration) -> Vec<String> {
    let neighbor = &config.neighbor;
    let mut markers = vec![format!(
        "neighbor {} remote-as {}",
        neighbor.ip, neighbor.remote_asn
    )];
    if let Receive::AcceptFiltered(prefixes) = &config.receive {
        markers.extend(prefixes.iter().map(ToString::to_string));
    }
    markers.extend(config.prefixes.iter().map(ToString::to_string));
    markers
}

/// Where the selected nodes stand with respect to an applied configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Convergence {
    /// every selected node runs the configuration
    Converged,
    /// a node reported a conversion failure about the neighbor it did not report before
    Failed { node: String, failure: String },
    /// selected nodes that did not catch up yet
    Pending(Vec<String>),
}

/// Tells from the FRR node states whether one configuration reached the nodes it selects.
/// Failures already reported before the apply are not attributed to it.
#[derive(Clone, Debug)]
pub struct ConversionWatch {
    neighbor: String,
    markers: Vec<String>,
    nodes: Vec<String>,
    failures_before: BTreeMap<String, String>,
}

impl ConversionWatch {
    #[must_use]
    pub fn new(config: &FrrConfiguration, nodes: Vec<String>, failures_before: BTreeMap<String, String>) -> Self {
        Self {
            neighbor: config.neighbor.ip.to_string(),
            markers: running_config_markers(config),
            nodes,
            failures_before,
        }
    }

    fn runs_config(&self, state: &FRRNodeState) -> bool {
        let running = state
            .status
            .as_ref()
            .and_then(|s| s.running_config.as_deref())
            .unwrap_or_default();
        self.markers.iter().all(|m| running.contains(m.as_str()))
    }

    #[must_use]
    pub fn check(&self, states: &[FRRNodeState]) -> Convergence {
        let mut pending = vec![];
        for node in &self.nodes {
            let Some(state) = states.iter().find(|s| s.name_any() == *node) else {
                pending.push(node.clone());
                continue;
            };
            match state.conversion_failure() {
                Some(failure)
                    if failure.contains(&self.neighbor)
                        && self.failures_before.get(node).map(String::as_str) != Some(failure) =>
                {
                    return Convergence::Failed {
                        node: node.clone(),
                        failure: failure.to_string(),
                    };
                }
                None if self.runs_config(state) => {}
                _ => pending.push(node.clone()),
            }
        }
        if pending.is_empty() && !self.nodes.is_empty() {
            Convergence::Converged
        } else {
            Convergence::Pending(pending)
        }
    }
}

/// Conversion failures currently reported, by node
#[must_use]
pub fn conversion_failures(states: &[FRRNodeState]) -> BTreeMap<String, String> {
    states
        .iter()
        .filter_map(|s| s.conversion_failure().map(|f| (s.name_any(), f.to_string())))
        .collect()
}
