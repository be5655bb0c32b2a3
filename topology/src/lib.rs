// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Deterministic configuration artifacts of the external FRR routers: `frr.conf`,
//! `daemons` and `vtysh.conf`, static route scripts, macvlan network attachment
//! definitions and the static-IP annotations attaching pods to them.
//!
//! Identical inputs always render to identical bytes.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod nad;
pub mod pod;
pub mod renderer;

use thiserror::Error;

pub use nad::{MacvlanNad, NetworkAttachment, static_ip_annotation};
pub use pod::{ExternalFrrPod, Role};
pub use renderer::bfd::BfdPeer;
pub use renderer::bgp::{BgpNeighbor, HubBgp, HubBgpBuilder, MasterBgp, MasterBgpBuilder};
pub use renderer::daemons::{Daemons, VtyshConf};
pub use renderer::routes::StaticRoute;
pub use renderer::{ConfigBuilder, Render};

use tracectl::trace_target;
trace_target!("topology", LevelFilter::INFO, &["frr-config"]);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Invalid topology: {0}")]
    Invalid(String),
    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Serialization failed: {0}")]
    Serialize(String),
}

impl From<derive_builder::UninitializedFieldError> for TopologyError {
    fn from(e: derive_builder::UninitializedFieldError) -> Self {
        TopologyError::MissingParameter(e.field_name())
    }
}
