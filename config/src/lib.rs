// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Suite configuration and the semantic model of the BGP resources a scenario creates.
//! The model is validated here and converted to CRD objects in [`converters::k8s`].

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod converters;
pub mod env;
pub mod model;

use std::net::IpAddr;

use ipnet::IpNet;
use thiserror::Error;

pub use env::EnvConfig;

use tracectl::trace_target;
trace_target!("config", LevelFilter::INFO, &["model"]);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Precondition unmet: {0}")]
    Unmet(String),
    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
    #[error("Invalid CIDR '{0}'")]
    InvalidCidr(String),
    #[error("Address pool {0} has no addresses")]
    EmptyPool(String),
    #[error("Address pool {0} ({1}) overlaps with pool {2} ({3})")]
    OverlappingPools(String, IpNet, String, IpNet),
    #[error("Advertisement {0} refers to unknown pool {1}")]
    UnknownPool(String, String),
    #[error("Advertisement {0}: aggregation length {1} is longer than prefix {2}")]
    AggregationTooLong(String, u8, IpNet),
    #[error("Peers {0:?} are not used by any advertisement")]
    UnusedPeers(Vec<String>),
    #[error("Duplicate {0} name {1}")]
    DuplicateName(&'static str, String),
    #[error("Invalid timers for peer {0}: {1}")]
    InvalidTimers(String, String),
    #[error("Conflicting configurations for neighbor {0}: {1}")]
    MergeConflict(IpAddr, String),
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

pub type ConfigResult = Result<(), ConfigError>;

impl From<derive_builder::UninitializedFieldError> for ConfigError {
    fn from(e: derive_builder::UninitializedFieldError) -> Self {
        ConfigError::MissingParameter(e.field_name())
    }
}

/// Parse a CIDR string, accepting a bare address as a host route.
pub fn parse_cidr(value: &str) -> Result<IpNet, ConfigError> {
    let value = value.trim();
    if let Ok(net) = value.parse::<IpNet>() {
        return Ok(net);
    }
    let addr = value
        .parse::<IpAddr>()
        .map_err(|_| ConfigError::InvalidCidr(value.to_string()))?;
    let len = if addr.is_ipv4() { 32 } else { 128 };
    IpNet::new(addr, len).map_err(|_| ConfigError::InvalidCidr(value.to_string()))
}
