// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The BGP scenarios and the suite running them

mod advertisement;
mod common;
mod frr_merge;
mod link;
mod multihop;
mod route_adv;
mod session;
mod timers;

use config::model::Family;

pub use advertisement::AggregatedPrefix;
pub use frr_merge::{MergeAccept, MergeReject};
pub use link::LinkFlap;
pub use multihop::MultiHopSessions;
pub use route_adv::PodNetworkAdvertisement;
pub use session::SessionRestore;
pub use timers::TimerUpdate;

use crate::context::ScenarioContext;
use crate::driver::Scenario;
use crate::suite::{Hook, Suite};

pub const BGP_SUITE: &str = "metallb bgp";

/// Every scenario for one address family, in run order
#[must_use]
pub fn scenarios(family: Family) -> Vec<Box<dyn Scenario<ScenarioContext>>> {
    vec![
        Box::new(SessionRestore { family }),
        Box::new(AggregatedPrefix { family, update: false }),
        Box::new(AggregatedPrefix { family, update: true }),
        Box::new(TimerUpdate { family }),
        Box::new(MergeAccept { family }),
        Box::new(MergeReject { family }),
        Box::new(PodNetworkAdvertisement { family }),
        Box::new(MultiHopSessions { family, ibgp: false }),
        Box::new(MultiHopSessions { family, ibgp: true }),
        Box::new(LinkFlap { family }),
    ]
}

/// The suite: workers are labeled around it, leftovers of aborted runs are removed before
/// and after, and every scenario must leave no speaker route behind.
#[must_use]
pub fn bgp_suite() -> Suite<ScenarioContext> {
    let mut suite = Suite::new(BGP_SUITE)
        .before_all(Hook::new("remove leftovers", |ctx: &mut ScenarioContext| {
            Box::pin(async move { ctx.remove_leftovers().await })
        }))
        .before_all(Hook::new("label workers", |ctx: &mut ScenarioContext| {
            Box::pin(async move { ctx.label_workers().await })
        }))
        .after_each(Hook::new("no speaker routes left", |ctx: &mut ScenarioContext| {
            Box::pin(async move { ctx.check_no_routes_left().await })
        }))
        .after_all(Hook::new("remove leftovers", |ctx: &mut ScenarioContext| {
            Box::pin(async move { ctx.remove_leftovers().await })
        }))
        .after_all(Hook::new("unlabel workers", |ctx: &mut ScenarioContext| {
            Box::pin(async move { ctx.unlabel_workers().await })
        }));
    for family in [Family::Ipv4, Family::Ipv6] {
        for scenario in scenarios(family) {
            suite = suite.scenario(scenario);
        }
    }
    suite
}
