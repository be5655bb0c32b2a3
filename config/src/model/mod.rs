// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Semantic model of the resources a BGP scenario creates

pub mod advertisement;
pub mod bfd;
pub mod frrconfig;
pub mod ipstack;
pub mod peer;
pub mod plan;
pub mod pool;
pub mod routeadv;

pub use advertisement::Advertisement;
pub use bfd::BfdProfile;
pub use frrconfig::{
    FrrConfiguration, FrrConfigurationBuilder, FrrNeighbor, MergedNeighbor, Receive,
    merge_frr_configurations,
};
pub use ipstack::{Family, IpStack};
pub use peer::Peer;
pub use plan::BgpPlan;
pub use pool::AddressPool;
pub use routeadv::{AdvertisementKind, RouteAdvertisement, RouteAdvertisementBuilder};
