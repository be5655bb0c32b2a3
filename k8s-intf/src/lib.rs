// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Typed gateway to the cluster under test: generic object operations, pods with exec
//! and logs, nodes and their labels. Every call carries a deadline and failures are
//! classified as transient or fatal.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod client;
pub mod error;
pub mod exec;
pub mod nodes;
pub mod pods;
pub mod store;
pub mod wait;

pub use client::{DEFAULT_CALL_TIMEOUT, FIELD_MANAGER, Gateway, Object};
pub use error::{ErrorClass, GatewayError, classify_code};
pub use exec::{ExecOutput, PodExec, PodRef, command};
pub use nodes::{node_addresses, selector_string};
pub use pods::{is_pod_ready, pod_node};
pub use store::{Namespaced, ObjectStore, wait_cluster_object, wait_gone, wait_object};
pub use wait::{Poll, poll_until};
