// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Management of the resources a scenario creates: MetalLB and FRR-K8s objects through the
//! [`Manager`], external FRR pods and speaker static routes through the [`Harness`].

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

#[cfg(test)]
pub(crate) mod fake;
pub mod harness;
pub mod manager;

use config::ConfigError;
use config::converters::k8s::FromK8sConversionError;
use k8s_intf::GatewayError;
use observer::ObserveError;
use topology::TopologyError;

pub use harness::routes::{RouteBook, RouteEntry};
pub use harness::{Harness, HarnessParams, HarnessParamsBuilder, speaker_pods};
pub use manager::Manager;

use tracectl::trace_target;
trace_target!("mgmt", LevelFilter::INFO, &["management"]);

#[derive(Debug, thiserror::Error)]
pub enum MgmtError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Observe(#[from] ObserveError),
    #[error("Cluster object could not be read: {0}")]
    Conversion(#[from] FromK8sConversionError),
    #[error("{0} was rejected: {1}")]
    Rejected(String, String),
    #[error("{0} selects no node running a speaker")]
    NoNodeSelected(String),
    #[error("{0} did not reach every node, still waiting for: {1}")]
    NotConverged(String, String),
    #[error("{0} was accepted but a failure was expected")]
    UnexpectedAcceptance(String),
    #[error("Failed to set route {route} in {pod}: {reason}")]
    Route {
        pod: String,
        route: String,
        reason: String,
    },
    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),
}

impl From<derive_builder::UninitializedFieldError> for MgmtError {
    fn from(value: derive_builder::UninitializedFieldError) -> Self {
        MgmtError::MissingParameter(value.field_name())
    }
}
