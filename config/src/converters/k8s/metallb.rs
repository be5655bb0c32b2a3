// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! MetalLB objects: pools, advertisements, peers and BFD profiles

use k8s_types::metallb::{
    BFDProfile, BFDProfileSpec, BGPAdvertisement, BGPAdvertisementSpec, BGPPeer, BGPPeerSpec,
    IPAddressPool, IPAddressPoolSpec,
};
use kube::ResourceExt;

use crate::converters::k8s::{FromK8sConversionError, label_selector};
use crate::model::peer::k8s_duration;
use crate::model::{Advertisement, AddressPool, BfdProfile, Peer};
use crate::parse_cidr;

impl From<&AddressPool> for IPAddressPool {
    fn from(pool: &AddressPool) -> Self {
        IPAddressPool::new(
            &pool.name,
            IPAddressPoolSpec {
                addresses: pool.cidrs.iter().map(ToString::to_string).collect(),
                auto_assign: Some(pool.auto_assign),
                avoid_buggy_ips: None,
            },
        )
    }
}

/// Pools found in the cluster, used to detect overlaps before creating new ones.
/// Address ranges (`a-b`) are not representable in the model and are rejected.
impl TryFrom<&IPAddressPool> for AddressPool {
    type Error = FromK8sConversionError;

    fn try_from(crd: &IPAddressPool) -> Result<Self, Self::Error> {
        let name = crd.name_any();
        let cidrs = crd
            .spec
            .addresses
            .iter()
            .map(|a| parse_cidr(a).map_err(|e| FromK8sConversionError::ParseError(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        if cidrs.is_empty() {
            return Err(FromK8sConversionError::MissingData(format!(
                "pool {name} has no addresses"
            )));
        }
        Ok(AddressPool {
            name,
            cidrs,
            auto_assign: crd.spec.auto_assign.unwrap_or(true),
        })
    }
}

impl From<&Advertisement> for BGPAdvertisement {
    fn from(adv: &Advertisement) -> Self {
        let non_empty = |v: Vec<String>| (!v.is_empty()).then_some(v);
        BGPAdvertisement::new(
            &adv.name,
            BGPAdvertisementSpec {
                aggregation_length: adv.aggregation_length_v4,
                aggregation_length_v6: adv.aggregation_length_v6,
                local_pref: adv.local_pref,
                communities: non_empty(adv.communities.iter().cloned().collect()),
                ip_address_pools: Some(vec![adv.pool.clone()]),
                ip_address_pool_selectors: None,
                node_selectors: adv
                    .node_selectors
                    .as_ref()
                    .and_then(label_selector)
                    .map(|s| vec![s]),
                peers: non_empty(adv.peer_selectors.iter().cloned().collect()),
            },
        )
    }
}

impl From<&Peer> for BGPPeer {
    fn from(peer: &Peer) -> Self {
        BGPPeer::new(
            &peer.name,
            BGPPeerSpec {
                my_asn: peer.local_asn,
                peer_asn: peer.remote_asn,
                peer_address: peer.peer_ip.to_string(),
                source_address: peer.source_address.map(|a| a.to_string()),
                peer_port: Some(peer.port),
                hold_time: peer.hold_time.map(k8s_duration),
                keepalive_time: peer.keepalive.map(k8s_duration),
                password: peer.password.clone(),
                bfd_profile: peer.bfd_profile.clone(),
                ebgp_multi_hop: peer.ebgp_multihop.then_some(true),
                ..Default::default()
            },
        )
    }
}

impl From<&BfdProfile> for BFDProfile {
    fn from(profile: &BfdProfile) -> Self {
        BFDProfile::new(
            &profile.name,
            BFDProfileSpec {
                receive_interval: profile.receive_interval_ms,
                transmit_interval: profile.transmit_interval_ms,
                detect_multiplier: profile.detect_multiplier,
                echo_interval: None,
                echo_mode: profile.echo_mode.then_some(true),
                passive_mode: profile.passive_mode.then_some(true),
                minimum_ttl: profile.minimum_ttl,
            },
        )
    }
}
