// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Description of an external FRR pod and the files its configmap carries

use std::collections::BTreeMap;
use std::net::IpAddr;

use config::model::Family;
use ipnet::IpNet;
use strum_macros::{Display, EnumString};
use tracing::debug;

use crate::TopologyError;
use crate::nad::{NetworkAttachment, static_ip_annotation};
use crate::renderer::daemons::{Daemons, VtyshConf};
use crate::renderer::{ConfigBuilder, Render};

pub const FRR_CONF: &str = "frr.conf";
pub const DAEMONS: &str = "daemons";
pub const VTYSH_CONF: &str = "vtysh.conf";
/// Where the configmap is mounted in the pod
pub const FRR_CONFIG_DIR: &str = "/etc/frr";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Hub,
    Master,
    External,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalFrrPod {
    pub name: String,
    pub role: Role,
    pub node: String,
    pub interfaces: Vec<NetworkAttachment>,
    /// rendered `frr.conf`
    pub bgp_config: String,
    pub bfd: bool,
}

impl ExternalFrrPod {
    #[must_use]
    pub fn new(name: &str, role: Role, node: &str, bgp_config: &ConfigBuilder) -> Self {
        Self {
            name: name.to_owned(),
            role,
            node: node.to_owned(),
            interfaces: vec![],
            bgp_config: bgp_config.to_string(),
            bfd: false,
        }
    }

    #[must_use]
    pub fn add_interface(mut self, attachment: NetworkAttachment) -> Self {
        self.interfaces.push(attachment);
        self
    }

    #[must_use]
    pub fn set_bfd(mut self, bfd: bool) -> Self {
        self.bfd = bfd;
        self
    }

    #[must_use]
    pub fn configmap_name(&self) -> String {
        format!("{}-frr-config", self.name)
    }

    /// Files of the configmap mounted at [`FRR_CONFIG_DIR`], keyed by file name
    #[must_use]
    pub fn config_files(&self) -> BTreeMap<String, String> {
        debug!("Rendering configuration files of {} ({})", self.name, self.role);
        BTreeMap::from([
            (FRR_CONF.to_string(), self.bgp_config.clone()),
            (
                DAEMONS.to_string(),
                Daemons::new(self.role, self.bfd).render(&()).to_string(),
            ),
            (VTYSH_CONF.to_string(), VtyshConf.render(&()).to_string()),
        ])
    }

    pub fn networks_annotation(&self) -> Result<String, TopologyError> {
        static_ip_annotation(&self.interfaces)
    }

    /// Every address of the pod on its secondary networks
    pub fn addresses(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.interfaces.iter().flat_map(NetworkAttachment::addresses)
    }

    /// First address of the given family, if any
    #[must_use]
    pub fn address(&self, family: Family) -> Option<IpAddr> {
        self.addresses().find(|a| Family::of(a) == family)
    }

    /// The pod's addresses of the family of `speaker` must share its /24 (or /64)
    pub fn check_same_subnet(&self, speaker: IpAddr) -> Result<(), TopologyError> {
        let family = Family::of(&speaker);
        let subnet = IpNet::new(speaker, family.subnet_prefix_len())
            .map_err(|e| TopologyError::Invalid(e.to_string()))?
            .trunc();
        match self
            .addresses()
            .filter(|a| Family::of(a) == family)
            .find(|a| !subnet.contains(a))
        {
            Some(outside) => Err(TopologyError::Invalid(format!(
                "{} address {outside} is not in {subnet} of {speaker}",
                self.name
            ))),
            None => Ok(()),
        }
    }
}
