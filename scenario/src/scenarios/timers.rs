// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Hold time and keepalive negotiated with the external router follow the peer

use std::time::Duration;

use async_trait::async_trait;
use config::model::Family;
use config::model::peer::{DEFAULT_HOLD_TIME, DEFAULT_KEEPALIVE};
use k8s_intf::Poll;
use observer::{Expect, Expectation, FrrPod};

use super::common::{PEER, Topology, apply_plan, deploy_master, require_cluster, sessions_up};
use crate::context::ScenarioContext;
use crate::driver::{Scenario, Steps};
use crate::error::ScenarioError;

pub const UPDATED_HOLD_TIME: Duration = Duration::from_secs(30);
pub const UPDATED_KEEPALIVE: Duration = Duration::from_secs(10);

pub struct TimerUpdate {
    pub family: Family,
}

async fn verify_timers(
    ctx: &ScenarioContext,
    steps: &mut Steps,
    master: &FrrPod<'_>,
    topology: &Topology,
    (hold_time, keepalive): (Duration, Duration),
    poll: Poll,
) -> Result<(), ScenarioError> {
    let label = format!(
        "sessions negotiated hold time {}s and keepalive {}s",
        hold_time.as_secs(),
        keepalive.as_secs()
    );
    for speaker in &topology.speakers {
        let timers = Expect::new(
            master,
            Expectation::NeighborTimers {
                neighbor: *speaker,
                hold_time,
                keepalive,
            },
        );
        steps.verify(&label, &timers, poll, &ctx.cancel()).await?;
    }
    Ok(())
}

#[async_trait]
impl Scenario<ScenarioContext> for TimerUpdate {
    fn name(&self) -> &'static str {
        match self.family {
            Family::Ipv4 => "bgp timer update (ipv4)",
            Family::Ipv6 => "bgp timer update (ipv6)",
        }
    }

    async fn preconditions(&self, ctx: &ScenarioContext) -> Result<(), ScenarioError> {
        require_cluster(ctx.facts(), self.family, 1)?;
        Topology::single_hop(ctx.env(), ctx.facts(), self.family, false, 1)?;
        Ok(())
    }

    async fn run(&self, ctx: &mut ScenarioContext, steps: &mut Steps) -> Result<(), ScenarioError> {
        let topology = Topology::single_hop(ctx.env(), ctx.facts(), self.family, false, 1)?;
        let mut plan = topology.plan()?;
        let bgp = topology.master_bgp().build()?;
        let master_pod = deploy_master(ctx, steps, &topology, &bgp).await?;
        apply_plan(ctx, steps, &plan).await?;

        let gw = ctx.gateway().clone();
        let master = FrrPod::new(&gw, master_pod);
        sessions_up(ctx, steps, &master, &topology.speakers).await?;
        verify_timers(
            ctx,
            steps,
            &master,
            &topology,
            (DEFAULT_HOLD_TIME, DEFAULT_KEEPALIVE),
            Poll::BGP,
        )
        .await?;

        let Some(peer) = plan.peer_mut(PEER) else {
            return Err(ScenarioError::Setup(format!("peer {PEER} missing from plan")));
        };
        *peer = peer
            .clone()
            .set_timers(Some(UPDATED_HOLD_TIME), Some(UPDATED_KEEPALIVE));
        let updated = peer.clone();
        steps
            .setup("update peer timers", ctx.manager().apply_peer(&updated, false))
            .await?;
        // timers only change when sessions are re-established
        steps.setup("reset the sessions", master.clear_sessions()).await?;
        verify_timers(
            ctx,
            steps,
            &master,
            &topology,
            (UPDATED_HOLD_TIME, UPDATED_KEEPALIVE),
            Poll::DEFAULT,
        )
        .await
    }
}
