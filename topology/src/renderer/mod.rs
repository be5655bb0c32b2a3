// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Renderers producing the configuration files of the external FRR pods

pub mod bfd;
pub mod bgp;
pub mod builder;
pub mod daemons;
pub mod routes;

pub use builder::{ConfigBuilder, MARKER, Render};
