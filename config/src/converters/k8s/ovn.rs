// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use k8s_types::ovn::{
    DEFAULT_NETWORK, NetworkSelector, RouteAdvertisements, RouteAdvertisementsSpec,
};

use crate::converters::k8s::label_selector;
use crate::model::RouteAdvertisement;

impl From<&RouteAdvertisement> for RouteAdvertisements {
    fn from(ra: &RouteAdvertisement) -> Self {
        let networks = if ra.network_selectors.is_empty() {
            vec![DEFAULT_NETWORK.to_string()]
        } else {
            ra.network_selectors.clone()
        };
        RouteAdvertisements::new(
            &ra.name,
            RouteAdvertisementsSpec {
                target_vrf: ra.target_vrf.clone(),
                advertisements: ra.advertisements.iter().map(ToString::to_string).collect(),
                node_selector: label_selector(&ra.node_selector).unwrap_or_default(),
                frr_configuration_selector: label_selector(&ra.frr_configuration_selector)
                    .unwrap_or_default(),
                network_selectors: networks
                    .into_iter()
                    .map(|network_selection_type| NetworkSelector {
                        network_selection_type,
                    })
                    .collect(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RouteAdvertisementBuilder;
    use std::collections::BTreeMap;

    #[test]
    fn test_route_advertisement_to_crd() {
        let ra = RouteAdvertisementBuilder::default()
            .name("default")
            .frr_configuration_selector(BTreeMap::from([(
                "routeadvertisement.k8s.ovn.org".to_string(),
                "enabled".to_string(),
            )]))
            .build()
            .unwrap();
        let crd = RouteAdvertisements::from(&ra);
        assert_eq!(crd.spec.advertisements, vec!["PodNetwork".to_string()]);
        assert_eq!(crd.spec.network_selectors[0].network_selection_type, "DefaultNetwork");
        assert!(crd.spec.node_selector.match_labels.is_none());
        assert_eq!(
            crd.spec
                .frr_configuration_selector
                .match_labels
                .unwrap()
                .len(),
            1
        );
    }
}
