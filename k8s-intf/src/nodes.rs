// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::collections::BTreeMap;
use std::net::IpAddr;

use k8s_openapi::api::core::v1::Node;
use kube::api::{Patch, PatchParams};
use serde_json::json;
#[allow(unused)]
use tracing::{debug, info};

use crate::client::Gateway;
use crate::error::GatewayError;

/// Label selector string for a label map, `key=value,...`. Empty values select on the key only.
#[must_use]
pub fn selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| {
            if v.is_empty() {
                k.clone()
            } else {
                format!("{k}={v}")
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Internal addresses of a node
#[must_use]
pub fn node_addresses(node: &Node) -> Vec<IpAddr> {
    node.status
        .as_ref()
        .and_then(|s| s.addresses.as_ref())
        .map(|addrs| {
            addrs
                .iter()
                .filter(|a| a.type_ == "InternalIP")
                .filter_map(|a| a.address.parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

impl Gateway {
    /// Nodes carrying every label of `labels`
    pub async fn list_nodes(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Node>, GatewayError> {
        let selector = selector_string(labels);
        let selector = (!selector.is_empty()).then_some(selector);
        self.list(&self.cluster::<Node>(), selector.as_deref()).await
    }

    pub async fn label_node(&self, name: &str, key: &str, value: &str) -> Result<(), GatewayError> {
        info!("Labeling node {name} with {key}={value}");
        self.patch_node_labels(name, json!({ "metadata": { "labels": { key: value } } }))
            .await
    }

    pub async fn unlabel_node(&self, name: &str, key: &str) -> Result<(), GatewayError> {
        info!("Removing label {key} from node {name}");
        self.patch_node_labels(name, json!({ "metadata": { "labels": { key: null } } }))
            .await
    }

    async fn patch_node_labels(
        &self,
        name: &str,
        patch: serde_json::Value,
    ) -> Result<(), GatewayError> {
        let api = self.cluster::<Node>();
        self.call(
            &format!("patch node {name}"),
            api.patch(name, &PatchParams::default(), &Patch::Merge(&patch)),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeAddress, NodeStatus};

    #[test]
    fn test_selector_string() {
        let labels = BTreeMap::from([
            ("node-role.kubernetes.io/worker".to_string(), String::new()),
            ("zone".to_string(), "a".to_string()),
        ]);
        assert_eq!(
            selector_string(&labels),
            "node-role.kubernetes.io/worker,zone=a"
        );
    }

    #[test]
    fn test_node_addresses() {
        let node = Node {
            status: Some(NodeStatus {
                addresses: Some(vec![
                    NodeAddress {
                        type_: "Hostname".to_string(),
                        address: "worker-0".to_string(),
                    },
                    NodeAddress {
                        type_: "InternalIP".to_string(),
                        address: "10.0.0.2".to_string(),
                    },
                    NodeAddress {
                        type_: "InternalIP".to_string(),
                        address: "fd00::2".to_string(),
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let addrs: Vec<String> = node_addresses(&node).iter().map(ToString::to_string).collect();
        assert_eq!(addrs, vec!["10.0.0.2", "fd00::2"]);
        assert!(node_addresses(&Node::default()).is_empty());
    }
}
