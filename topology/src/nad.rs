// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Macvlan network attachment definitions and the pod annotations selecting them

use std::net::IpAddr;

use ipnet::IpNet;
use k8s_types::nad::{NetworkAttachmentDefinition, NetworkAttachmentDefinitionSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;

use crate::TopologyError;

pub const CNI_VERSION: &str = "0.4.0";

#[derive(Serialize)]
struct Ipam {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct MacvlanConfig<'a> {
    #[serde(rename = "cniVersion")]
    cni_version: &'static str,
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    master: &'a str,
    mode: &'static str,
    ipam: Ipam,
}

/// A macvlan secondary network in bridge mode, addresses assigned statically by the pods
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacvlanNad {
    pub name: String,
    pub namespace: String,
    pub master: String,
}

impl MacvlanNad {
    #[must_use]
    pub fn new(name: &str, master: &str, namespace: &str) -> Self {
        Self {
            name: name.to_owned(),
            namespace: namespace.to_owned(),
            master: master.to_owned(),
        }
    }

    /// The CNI configuration
    pub fn config(&self) -> Result<String, TopologyError> {
        let cfg = MacvlanConfig {
            cni_version: CNI_VERSION,
            name: &self.name,
            kind: "macvlan",
            master: &self.master,
            mode: "bridge",
            ipam: Ipam { kind: "static" },
        };
        serde_json::to_string(&cfg).map_err(|e| TopologyError::Serialize(e.to_string()))
    }

    pub fn to_crd(&self) -> Result<NetworkAttachmentDefinition, TopologyError> {
        Ok(NetworkAttachmentDefinition {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            spec: NetworkAttachmentDefinitionSpec {
                config: self.config()?,
            },
        })
    }
}

/// One secondary interface of a pod: the network and the addresses it gets there
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NetworkAttachment {
    pub name: String,
    pub namespace: String,
    #[serde(serialize_with = "serialize_ips")]
    pub ips: Vec<IpNet>,
}

fn serialize_ips<S: serde::Serializer>(ips: &[IpNet], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(ips.iter().map(ToString::to_string))
}

impl NetworkAttachment {
    #[must_use]
    pub fn new(nad: &MacvlanNad, ips: Vec<IpNet>) -> Self {
        Self {
            name: nad.name.clone(),
            namespace: nad.namespace.clone(),
            ips,
        }
    }

    /// Addresses without prefix length
    pub fn addresses(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.ips.iter().map(IpNet::addr)
    }
}

/// Value of the `k8s.v1.cni.cncf.io/networks` annotation attaching the pod to `attachments`
pub fn static_ip_annotation(attachments: &[NetworkAttachment]) -> Result<String, TopologyError> {
    serde_json::to_string(attachments).map_err(|e| TopologyError::Serialize(e.to_string()))
}
