// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! OVN-Kubernetes route advertisements

use std::collections::BTreeMap;

use derive_builder::Builder;
use strum_macros::{Display, EnumString};

use crate::{ConfigError, ConfigResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Display, EnumString)]
pub enum AdvertisementKind {
    #[strum(serialize = "PodNetwork")]
    PodNetwork,
    #[strum(serialize = "EgressIP")]
    EgressIp,
}

#[derive(Builder, Clone, Debug, PartialEq, Eq)]
#[builder(build_fn(validate = "Self::validate", error = "ConfigError"))]
pub struct RouteAdvertisement {
    #[builder(setter(into))]
    pub name: String,
    #[builder(default = "vec![AdvertisementKind::PodNetwork]")]
    pub advertisements: Vec<AdvertisementKind>,
    /// empty selects every node
    #[builder(default)]
    pub node_selector: BTreeMap<String, String>,
    /// labels of the FRRConfigurations OVN-K builds on
    #[builder(default)]
    pub frr_configuration_selector: BTreeMap<String, String>,
    /// defaults to the cluster default network
    #[builder(default)]
    pub network_selectors: Vec<String>,
    #[builder(setter(into, strip_option), default)]
    pub target_vrf: Option<String>,
}

impl RouteAdvertisementBuilder {
    fn validate(&self) -> ConfigResult {
        match &self.advertisements {
            Some(kinds) if kinds.is_empty() => Err(ConfigError::InvalidValue(
                "advertisements",
                "at least one kind is required".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl RouteAdvertisement {
    #[must_use]
    pub fn advertises_pod_network(&self) -> bool {
        self.advertisements.contains(&AdvertisementKind::PodNetwork)
    }
}
