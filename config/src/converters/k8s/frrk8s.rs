// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use k8s_types::frrk8s::{
    AllowedInPrefixes, AllowedOutPrefixes, BgpConfig, FRRConfiguration as FRRConfigurationCrd,
    FRRConfigurationSpec, Neighbor, PrefixSelector, Receive as ReceiveCrd, Router,
};

use crate::converters::k8s::{label_selector, metadata};
use crate::model::{FrrConfiguration, Receive};

const MODE_ALL: &str = "all";
const MODE_FILTERED: &str = "filtered";

fn to_receive(receive: &Receive) -> Option<ReceiveCrd> {
    let allowed = match receive {
        Receive::AcceptAll => AllowedInPrefixes {
            mode: Some(MODE_ALL.to_string()),
            prefixes: None,
        },
        Receive::AcceptFiltered(set) if set.is_empty() => return None,
        Receive::AcceptFiltered(set) => AllowedInPrefixes {
            mode: Some(MODE_FILTERED.to_string()),
            prefixes: Some(
                set.iter()
                    .map(|p| PrefixSelector {
                        prefix: p.to_string(),
                        le: None,
                        ge: None,
                    })
                    .collect(),
            ),
        },
    };
    Some(ReceiveCrd { allowed })
}

impl From<&FrrConfiguration> for FRRConfigurationCrd {
    fn from(config: &FrrConfiguration) -> Self {
        let n = &config.neighbor;
        let prefixes: Vec<String> = config.prefixes.iter().map(ToString::to_string).collect();
        let neighbor = Neighbor {
            asn: n.remote_asn,
            address: n.ip.to_string(),
            port: Some(n.port),
            password: n.password.clone(),
            ebgp_multi_hop: n.ebgp_multihop.then_some(true),
            disable_mp: n.disable_mp.then_some(true),
            to_advertise: (!prefixes.is_empty()).then(|| k8s_types::frrk8s::Advertise {
                allowed: AllowedOutPrefixes {
                    mode: Some(MODE_FILTERED.to_string()),
                    prefixes: Some(prefixes.clone()),
                },
            }),
            to_receive: to_receive(&config.receive),
            ..Default::default()
        };
        let spec = FRRConfigurationSpec {
            bgp: BgpConfig {
                routers: vec![Router {
                    asn: config.local_asn,
                    neighbors: vec![neighbor],
                    prefixes: (!prefixes.is_empty()).then_some(prefixes),
                    ..Default::default()
                }],
                bfd_profiles: None,
            },
            raw: None,
            node_selector: label_selector(&config.node_selector),
        };
        FRRConfigurationCrd {
            metadata: metadata(&config.name, config.namespace.as_deref(), &config.labels),
            spec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FrrConfigurationBuilder, FrrNeighbor};

    #[test]
    fn test_filtered_configuration() {
        let config = FrrConfigurationBuilder::default()
            .name("accept-100")
            .namespace("openshift-frr-k8s")
            .local_asn(64501)
            .neighbor(FrrNeighbor::new("10.0.0.1".parse().unwrap(), 64500))
            .receive(Receive::filtered(&["192.168.100.0/24"]).unwrap())
            .build()
            .unwrap();
        let crd = FRRConfigurationCrd::from(&config);
        assert_eq!(crd.metadata.namespace.as_deref(), Some("openshift-frr-k8s"));
        let router = &crd.spec.bgp.routers[0];
        assert_eq!(router.asn, 64501);
        assert_eq!(router.prefixes, None);
        let neighbor = &router.neighbors[0];
        assert_eq!(neighbor.asn, 64500);
        assert_eq!(neighbor.address, "10.0.0.1");
        assert!(neighbor.to_advertise.is_none());
        let allowed = &neighbor.to_receive.as_ref().unwrap().allowed;
        assert_eq!(allowed.mode.as_deref(), Some("filtered"));
        assert_eq!(
            allowed.prefixes.as_ref().unwrap()[0].prefix,
            "192.168.100.0/24"
        );
    }

    #[test]
    fn test_accept_all_with_labels() {
        let config = FrrConfigurationBuilder::default()
            .name("ra-base")
            .local_asn(64501)
            .neighbor(FrrNeighbor::new("10.0.0.1".parse().unwrap(), 64500).set_disable_mp(true))
            .receive(Receive::AcceptAll)
            .label("routeadvertisement.k8s.ovn.org", "enabled")
            .build()
            .unwrap();
        let crd = FRRConfigurationCrd::from(&config);
        assert!(crd.metadata.namespace.is_none());
        assert_eq!(
            crd.metadata.labels.unwrap()["routeadvertisement.k8s.ovn.org"],
            "enabled"
        );
        let neighbor = &crd.spec.bgp.routers[0].neighbors[0];
        assert_eq!(neighbor.disable_mp, Some(true));
        assert_eq!(
            neighbor.to_receive.as_ref().unwrap().allowed.mode.as_deref(),
            Some("all")
        );
    }
}
