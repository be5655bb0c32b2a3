// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Sessions follow the switch ports of the workers: down with the ports, up again after.

use async_trait::async_trait;
use config::model::Family;
use k8s_intf::Poll;
use observer::{Expect, Expectation, FrrPod};

use super::common::{Topology, apply_plan, deploy_master, require_cluster, sessions_up};
use crate::context::ScenarioContext;
use crate::driver::{Cleanup, Scenario, Steps};
use crate::error::ScenarioError;
use crate::switch::InterfaceState;

pub struct LinkFlap {
    pub family: Family,
}

#[async_trait]
impl Scenario<ScenarioContext> for LinkFlap {
    fn name(&self) -> &'static str {
        match self.family {
            Family::Ipv4 => "bgp sessions follow switch ports (ipv4)",
            Family::Ipv6 => "bgp sessions follow switch ports (ipv6)",
        }
    }

    async fn preconditions(&self, ctx: &ScenarioContext) -> Result<(), ScenarioError> {
        let switch = ctx.env().require_switch()?;
        if switch.interfaces.is_empty() {
            return Err(ScenarioError::Skip("no switch interfaces configured".to_string()));
        }
        require_cluster(ctx.facts(), self.family, 1)?;
        Topology::single_hop(ctx.env(), ctx.facts(), self.family, false, 1)?;
        Ok(())
    }

    async fn run(&self, ctx: &mut ScenarioContext, steps: &mut Steps) -> Result<(), ScenarioError> {
        let topology = Topology::single_hop(ctx.env(), ctx.facts(), self.family, false, 1)?;
        let bgp = topology.master_bgp().build()?;
        let master_pod = deploy_master(ctx, steps, &topology, &bgp).await?;
        apply_plan(ctx, steps, &topology.plan()?).await?;

        let gw = ctx.gateway().clone();
        let cancel = ctx.cancel();
        let master = FrrPod::new(&gw, master_pod);
        sessions_up(ctx, steps, &master, &topology.speakers).await?;

        let ports = ctx.env().switch.interfaces.clone();
        steps.defer(Cleanup::Switch);
        let switch = steps.setup("open switch session", ctx.switch()).await?;
        steps
            .setup(
                "shut the worker switch ports",
                switch.set_interfaces_state(&ports, InterfaceState::Down),
            )
            .await?;
        steps
            .verify(
                "sessions with the speakers go down",
                &Expect::new(&master, Expectation::SessionsDown(topology.speakers.clone())),
                Poll::BGP,
                &cancel,
            )
            .await?;

        let switch = ctx.switch().await?;
        steps
            .setup(
                "bring the worker switch ports up",
                switch.set_interfaces_state(&ports, InterfaceState::Up),
            )
            .await?;
        sessions_up(ctx, steps, &master, &topology.speakers).await
    }
}
