// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! OVN-Kubernetes route advertisements (`k8s.ovn.org`)

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, LabelSelector};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const ADVERTISE_POD_NETWORK: &str = "PodNetwork";
pub const ADVERTISE_EGRESS_IP: &str = "EgressIP";
pub const CONDITION_ACCEPTED: &str = "Accepted";
pub const DEFAULT_NETWORK: &str = "DefaultNetwork";

/// Label FRR configurations must carry to be picked by route advertisements
pub const RA_LABEL_KEY: &str = "routeadvertisement.k8s.ovn.org";
pub const RA_LABEL_VALUE: &str = "enabled";

/// Cluster scoped.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "k8s.ovn.org",
    version = "v1",
    kind = "RouteAdvertisements",
    plural = "routeadvertisements",
    status = "RouteAdvertisementsStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct RouteAdvertisementsSpec {
    #[serde(default, rename = "targetVRF", skip_serializing_if = "Option::is_none")]
    pub target_vrf: Option<String>,
    pub advertisements: Vec<String>,
    #[serde(default)]
    pub node_selector: LabelSelector,
    #[serde(default)]
    pub frr_configuration_selector: LabelSelector,
    #[serde(default)]
    pub network_selectors: Vec<NetworkSelector>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSelector {
    pub network_selection_type: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteAdvertisementsStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
}

impl RouteAdvertisements {
    /// Tell if OVN-K accepted this object, either through the summary status or the
    /// `Accepted` condition.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        let Some(status) = self.status.as_ref() else {
            return false;
        };
        if status.status.as_deref() == Some(CONDITION_ACCEPTED) {
            return true;
        }
        status
            .conditions
            .iter()
            .flatten()
            .any(|c| c.type_ == CONDITION_ACCEPTED && c.status == "True")
    }
}
