// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The context scenarios run against a live cluster with

use async_trait::async_trait;
use config::EnvConfig;
use config::model::IpStack;
use k8s_intf::{DEFAULT_CALL_TIMEOUT, Gateway, ObjectStore, PodRef, pod_node};
use k8s_openapi::api::core::v1::{Pod, Service};
use mgmt::harness::{SPEAKER_FRR_CONTAINER, SPEAKER_SELECTOR};
use mgmt::{Harness, HarnessParams, HarnessParamsBuilder, Manager, speaker_pods};
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, info, warn};

use crate::driver::{Cleanup, Context};
use crate::error::ScenarioError;
use crate::preconditions::ClusterFacts;
use crate::report::Reporter;
use crate::switch::{InterfaceState, LabSwitch, SwitchConnector, SwitchSlot};
use crate::workload::{backend, load_balancer, workload_selector};

/// Label put on the workers for the duration of a suite; advertisements select it
pub const SUITE_NODE_LABEL: (&str, &str) = ("metallb-e2e/bgp-speaker", "true");

pub struct ScenarioContext {
    env: EnvConfig,
    gw: Gateway,
    facts: ClusterFacts,
    /// parent of every scenario token
    suite_cancel: CancellationToken,
    cancel: CancellationToken,
    params: HarnessParams,
    manager: Manager,
    harness: Harness,
    reporter: Option<Reporter>,
    switch: SwitchSlot,
    connector: Option<Box<dyn SwitchConnector>>,
}

impl ScenarioContext {
    /// Connect to the cluster named by the configuration and learn what it offers
    pub async fn connect(env: EnvConfig, suite_cancel: CancellationToken) -> Result<Self, ScenarioError> {
        let gw = Gateway::from_kubeconfig(env.kubeconfig.as_deref(), DEFAULT_CALL_TIMEOUT).await?;
        Self::with_gateway(env, gw, suite_cancel).await
    }

    pub async fn with_gateway(
        env: EnvConfig,
        gw: Gateway,
        suite_cancel: CancellationToken,
    ) -> Result<Self, ScenarioError> {
        let facts = ClusterFacts::gather(&gw, &env).await?;
        gw.ensure_namespace(&env.test_namespace).await?;
        let params = HarnessParamsBuilder::default()
            .namespace(env.test_namespace.as_str())
            .image(env.frr_image.as_str())
            .build()?;
        let cancel = suite_cancel.child_token();
        let manager = Manager::new(gw.clone(), &env, cancel.clone());
        let harness = Harness::new(gw.clone(), params.clone(), cancel.clone());
        let reporter = env.report_dir.clone().map(|dir| Reporter {
            dir,
            operator_namespace: env.operator_namespace.clone(),
            frr_namespace: env.frrk8s_namespace.clone(),
        });
        Ok(Self {
            env,
            gw,
            facts,
            suite_cancel,
            cancel,
            params,
            manager,
            harness,
            reporter,
            switch: SwitchSlot::default(),
            connector: None,
        })
    }

    /// How switch sessions get opened. Scenarios needing the switch skip without one.
    pub fn set_switch_connector(&mut self, connector: Box<dyn SwitchConnector>) {
        self.connector = Some(connector);
    }

    #[must_use]
    pub fn env(&self) -> &EnvConfig {
        &self.env
    }

    #[must_use]
    pub fn gateway(&self) -> &Gateway {
        &self.gw
    }

    #[must_use]
    pub fn facts(&self) -> &ClusterFacts {
        &self.facts
    }

    /// Token of the running scenario
    #[must_use]
    pub fn cancel(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn harness(&mut self) -> &mut Harness {
        &mut self.harness
    }

    /// Every speaker, addressed at its FRR container
    pub async fn speakers(&self) -> Result<Vec<PodRef>, ScenarioError> {
        Ok(speaker_pods(&self.gw, &self.env.frrk8s_namespace).await?)
    }

    /// The speaker running on `node`
    pub async fn speaker_on(&self, node: &str) -> Result<PodRef, ScenarioError> {
        self.gw
            .list_pods(&self.env.frrk8s_namespace, Some(SPEAKER_SELECTOR))
            .await?
            .iter()
            .find(|p| pod_node(p) == Some(node))
            .map(|p| PodRef::of(p, Some(SPEAKER_FRR_CONTAINER)))
            .ok_or_else(|| ScenarioError::Setup(format!("no speaker runs on {node}")))
    }

    /// The scenario's switch session, opened on first use
    pub async fn switch(&mut self) -> Result<&mut dyn LabSwitch, ScenarioError> {
        let credentials = self.env.require_switch()?;
        let Some(connector) = self.connector.as_deref() else {
            return Err(ScenarioError::Skip("no switch transport configured".to_string()));
        };
        self.switch.open(connector, credentials).await
    }

    /// Put the suite label on every worker
    pub async fn label_workers(&self) -> Result<(), ScenarioError> {
        for worker in &self.facts.workers {
            self.gw
                .label_node(&worker.name, SUITE_NODE_LABEL.0, SUITE_NODE_LABEL.1)
                .await?;
        }
        Ok(())
    }

    /// Remove the suite label from every worker. Keeps going after a failure.
    pub async fn unlabel_workers(&self) -> Result<(), ScenarioError> {
        let mut first_error = None;
        for worker in &self.facts.workers {
            if let Err(e) = self.gw.unlabel_node(&worker.name, SUITE_NODE_LABEL.0).await {
                warn!("Failed to unlabel {}: {e}", worker.name);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Delete the BGP resources and workloads left in the namespaces, e.g. by an aborted run
    pub async fn remove_leftovers(&self) -> Result<(), ScenarioError> {
        let deleted = Manager::new(self.gw.clone(), &self.env, self.suite_cancel.child_token())
            .cleanup_namespace()
            .await?;
        self.delete_workloads().await?;
        if deleted > 0 {
            warn!("Removed {deleted} objects left from an earlier run");
        }
        Ok(())
    }

    /// Routes installed by the last scenario that teardown did not remove, either still
    /// recorded after a failed removal or still listed by their pod
    pub async fn check_no_routes_left(&self) -> Result<(), ScenarioError> {
        let recorded = self.harness.routes().entries();
        let listed = self.harness.routes_left().await?;
        let left: Vec<String> = recorded
            .iter()
            .chain(listed.iter().filter(|e| !recorded.contains(e)))
            .map(|e| format!("{} in {}", e.route, e.pod))
            .collect();
        if left.is_empty() {
            return Ok(());
        }
        Err(ScenarioError::Setup(format!("routes left behind: {}", left.join(", "))))
    }

    /// A load balancer service taking its address from `pool`, with a pod behind it
    pub async fn deploy_workload(&self, name: &str, pool: &str, stack: IpStack) -> Result<(), ScenarioError> {
        let ns = &self.env.test_namespace;
        self.gw
            .apply(&self.gw.namespaced::<Pod>(ns), &backend(name, ns, &self.env.frr_image))
            .await?;
        self.gw
            .apply(&self.gw.namespaced::<Service>(ns), &load_balancer(name, ns, pool, stack))
            .await?;
        info!("Deployed load balancer {name} on pool {pool}");
        Ok(())
    }

    async fn delete_workloads(&self) -> Result<(), ScenarioError> {
        let ns = &self.env.test_namespace;
        let selector = workload_selector();
        let services = self.gw.delete_all_in::<Service>(ns, Some(&selector)).await?;
        let pods = self.gw.delete_all_in::<Pod>(ns, Some(&selector)).await?;
        debug!("Deleted {services} services and {pods} backends");
        Ok(())
    }
}

#[async_trait]
impl Context for ScenarioContext {
    fn begin(&mut self, scenario: &str) -> CancellationToken {
        debug!("Starting {scenario}");
        self.cancel = self.suite_cancel.child_token();
        self.manager = Manager::new(self.gw.clone(), &self.env, self.cancel.clone());
        self.harness = Harness::new(self.gw.clone(), self.params.clone(), self.cancel.clone());
        self.cancel.clone()
    }

    async fn cleanup(&mut self, cleanup: &Cleanup) -> Result<(), ScenarioError> {
        // cleanups never wait on the scenario token, which is cancelled by now
        match cleanup {
            Cleanup::Namespace => {
                self.manager.cleanup_namespace().await?;
                Ok(())
            }
            Cleanup::Harness => {
                let failures = self.harness.teardown().await;
                if failures.is_empty() {
                    Ok(())
                } else {
                    let failures: Vec<String> = failures.iter().map(ToString::to_string).collect();
                    Err(ScenarioError::Setup(failures.join("; ")))
                }
            }
            Cleanup::Workloads => self.delete_workloads().await,
            Cleanup::RouteAdvertisement(name) => {
                self.manager.delete_route_advertisement(name).await?;
                Ok(())
            }
            Cleanup::Switch => {
                let ports = self.env.switch.interfaces.clone();
                let restored = match self.switch.session_mut() {
                    Some(session) => session.set_interfaces_state(&ports, InterfaceState::Up).await,
                    None => Ok(()),
                };
                let closed = self.switch.close().await;
                restored.and(closed)
            }
        }
    }

    async fn report(&mut self, scenario: &str) -> Vec<String> {
        let Some(reporter) = &self.reporter else {
            return vec![];
        };
        let mut warnings = reporter.report(&self.gw, scenario).await;
        match speaker_pods(&self.gw, &self.env.frrk8s_namespace).await {
            Ok(speakers) => warnings.extend(reporter.logs(&self.gw, scenario, &speakers).await),
            Err(e) => warnings.push(format!("report: speakers: {e}")),
        }
        warnings
    }

    async fn end(&mut self) -> Vec<String> {
        match self.switch.close().await {
            Ok(()) => vec![],
            Err(e) => vec![format!("switch session: {e}")],
        }
    }
}
