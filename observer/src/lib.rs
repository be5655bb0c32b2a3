// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! BGP observer: runs `vtysh` in FRR pods, parses its JSON output and waits for
//! expectations on sessions, prefixes and path attributes.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod error;
pub mod expect;
pub mod frr;
pub mod poll;
pub mod state;
pub mod vtysh;

pub use error::ObserveError;
pub use expect::{Condition, Evaluation, Expect, Expectation, ExpectedAttributes};
pub use frr::{NeighborState, PrefixAttributes, normalize_community};
pub use poll::wait_for;
pub use state::SessionState;
pub use vtysh::FrrPod;

use tracectl::trace_target;
trace_target!("observer", LevelFilter::INFO, &["bgp"]);
