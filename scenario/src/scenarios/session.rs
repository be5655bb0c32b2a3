// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A session shut down on the external router goes down on both ends, the others stay up,
//! and it comes back once re-enabled.

use async_trait::async_trait;
use config::model::Family;
use k8s_intf::Poll;
use observer::{Expect, Expectation, FrrPod, SessionState};

use super::common::{Topology, apply_plan, deploy_master, require_cluster, sessions_up};
use crate::context::ScenarioContext;
use crate::driver::{Scenario, Steps};
use crate::error::ScenarioError;

pub struct SessionRestore {
    pub family: Family,
}

#[async_trait]
impl Scenario<ScenarioContext> for SessionRestore {
    fn name(&self) -> &'static str {
        match self.family {
            Family::Ipv4 => "bgp session down and restore (ipv4)",
            Family::Ipv6 => "bgp session down and restore (ipv6)",
        }
    }

    async fn preconditions(&self, ctx: &ScenarioContext) -> Result<(), ScenarioError> {
        require_cluster(ctx.facts(), self.family, 2)?;
        ctx.facts().require_multi_node()?;
        Topology::single_hop(ctx.env(), ctx.facts(), self.family, false, 2)?;
        Ok(())
    }

    async fn run(&self, ctx: &mut ScenarioContext, steps: &mut Steps) -> Result<(), ScenarioError> {
        let topology = Topology::single_hop(ctx.env(), ctx.facts(), self.family, false, 2)?;
        let bgp = topology.master_bgp().build()?;
        let master_pod = deploy_master(ctx, steps, &topology, &bgp).await?;
        apply_plan(ctx, steps, &topology.plan()?).await?;

        let gw = ctx.gateway().clone();
        let cancel = ctx.cancel();
        let master = FrrPod::new(&gw, master_pod);
        sessions_up(ctx, steps, &master, &topology.speakers).await?;

        let (w0, w1) = (topology.speakers[0], topology.speakers[1]);
        let w1_node = ctx.facts().workers[1].name.clone();
        let w1_speaker = FrrPod::new(&gw, steps.setup("find speaker of second worker", ctx.speaker_on(&w1_node)).await?);

        steps
            .setup(
                "shut down the session with the second worker",
                master.shutdown_neighbor(topology.master_asn, w1),
            )
            .await?;
        steps
            .verify(
                "session with the second worker is down",
                &Expect::new(&master, Expectation::SessionsDown(vec![w1])),
                Poll::BGP,
                &cancel,
            )
            .await?;
        steps
            .verify(
                "second worker speaker retries the master",
                &Expect::new(
                    &w1_speaker,
                    Expectation::NeighborInState(topology.master_ip(), SessionState::Active),
                ),
                Poll::BGP,
                &cancel,
            )
            .await?;
        steps
            .verify(
                "session with the first worker stays established",
                &Expect::new(&master, Expectation::SessionsUp(vec![w0])),
                Poll::BGP,
                &cancel,
            )
            .await?;

        steps
            .setup(
                "re-enable the session with the second worker",
                master.no_shutdown_neighbor(topology.master_asn, w1),
            )
            .await?;
        sessions_up(ctx, steps, &master, &topology.speakers).await
    }
}
