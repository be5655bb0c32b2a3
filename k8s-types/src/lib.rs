// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! CRD type definitions for the resources the BGP test core drives: MetalLB, FRR-K8s,
//! OVN-Kubernetes route advertisements and Multus network attachments.

#![deny(clippy::all, clippy::pedantic)]
// kinds keep their upstream spelling (BGPPeer, FRRConfiguration, ...)
#![allow(clippy::upper_case_acronyms, clippy::struct_excessive_bools)]

pub mod frrk8s;
pub mod metallb;
pub mod nad;
pub mod ovn;

pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, LabelSelector};
