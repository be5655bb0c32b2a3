// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! External FRR pods: their networks, configuration and lifetime, plus the static routes
//! speakers need to reach them.

pub mod podspec;
pub mod routes;

use async_trait::async_trait;
use derive_builder::Builder;
use k8s_intf::{
    Gateway, GatewayError, Namespaced, ObjectStore, PodRef, Poll, is_pod_ready, wait_gone, wait_object,
};
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use k8s_types::nad::NetworkAttachmentDefinition;
use observer::{Condition, Evaluation, FrrPod, ObserveError, wait_for};
use tokio_util::sync::CancellationToken;
use topology::{ExternalFrrPod, MacvlanNad, StaticRoute};
#[allow(unused)]
use tracing::{debug, error, info, warn};

use crate::MgmtError;
use podspec::{FRR_CONTAINER, frr_configmap, frr_pod};
use routes::{RouteBook, RouteEntry};

/// Label of the FRR-K8s daemonset pods the speakers run in
pub const SPEAKER_SELECTOR: &str = "app=frr-k8s";
/// Container of the speaker pods running FRR
pub const SPEAKER_FRR_CONTAINER: &str = "frr";

#[derive(Builder, Clone, Debug)]
#[builder(build_fn(error = "MgmtError"))]
pub struct HarnessParams {
    /// namespace of the external pods, their configmaps and NADs
    #[builder(setter(into))]
    pub namespace: String,
    #[builder(setter(into))]
    pub image: String,
    /// deadline for pods to come up
    #[builder(default = "Poll::SETUP")]
    pub ready: Poll,
    /// deadline for each teardown wait
    #[builder(default = "Poll::DEFAULT")]
    pub teardown: Poll,
}

/// FRR answers `vtysh`. Failing execs only mean it is not up yet.
struct Responds<'a>(&'a FrrPod<'a>);

#[async_trait]
impl Condition for Responds<'_> {
    fn describe(&self) -> String {
        format!("FRR in {}", self.0.pod())
    }

    async fn evaluate(&self) -> Result<Evaluation, ObserveError> {
        match self.0.responds().await {
            Ok(up) => Ok(Evaluation::new(up, if up { "up" } else { "unexpected version output" })),
            Err(ObserveError::Gateway(GatewayError::ExecFailed { output, .. })) => {
                Ok(Evaluation::new(false, output))
            }
            Err(e) => Err(e),
        }
    }
}

/// Speaker pods, addressed at their FRR container
pub async fn speaker_pods<S: ObjectStore>(store: &S, namespace: &str) -> Result<Vec<PodRef>, MgmtError> {
    let pods: Vec<Pod> = store.list_in(namespace, Some(SPEAKER_SELECTOR)).await?;
    Ok(pods
        .iter()
        .map(|p| PodRef::of(p, Some(SPEAKER_FRR_CONTAINER)))
        .collect())
}

/// Deploys external FRR pods and records everything it creates so that
/// [`Harness::teardown`] can remove it: routes, then pods, then NADs, then configmaps.
pub struct Harness<S = Gateway> {
    store: S,
    params: HarnessParams,
    cancel: CancellationToken,
    /// namespace and name of what was created, in creation order
    pods: Vec<(String, String)>,
    configmaps: Vec<(String, String)>,
    nads: Vec<(String, String)>,
    routes: RouteBook,
}

impl<S: ObjectStore> Harness<S> {
    #[must_use]
    pub fn new(store: S, params: HarnessParams, cancel: CancellationToken) -> Self {
        Self {
            store,
            params,
            cancel,
            pods: vec![],
            configmaps: vec![],
            nads: vec![],
            routes: RouteBook::new(),
        }
    }

    #[must_use]
    pub fn routes(&self) -> &RouteBook {
        &self.routes
    }

    /// Routes installed since the harness was created that are still in their pod
    pub async fn routes_left(&self) -> Result<Vec<RouteEntry>, MgmtError> {
        self.routes.left_behind(&self.store).await
    }

    /// Create the NAD unless it exists and wait for it to show up
    pub async fn ensure_nad(&mut self, nad: &MacvlanNad) -> Result<(), MgmtError> {
        let existing: Option<NetworkAttachmentDefinition> =
            self.store.get_in(&nad.namespace, &nad.name).await?;
        if existing.is_none() {
            self.store.create_in(&nad.namespace, &nad.to_crd()?).await?;
            self.nads.push((nad.namespace.clone(), nad.name.clone()));
            info!("Created network attachment {}/{}", nad.namespace, nad.name);
        }
        wait_object(
            &self.store,
            &nad.namespace,
            &nad.name,
            Poll::NAD,
            &self.cancel,
            |_: &NetworkAttachmentDefinition| true,
        )
        .await?;
        Ok(())
    }

    /// Deploy an external FRR pod on its node and wait until FRR answers
    pub async fn deploy(&mut self, pod: &ExternalFrrPod, nads: &[MacvlanNad]) -> Result<PodRef, MgmtError> {
        let namespace = self.params.namespace.clone();
        for nad in nads {
            self.ensure_nad(nad).await?;
        }

        self.store
            .apply_in(&namespace, &frr_configmap(pod, &namespace))
            .await?;
        self.configmaps
            .push((namespace.clone(), pod.configmap_name()));

        self.store
            .apply_in(&namespace, &frr_pod(pod, &namespace, &self.params.image)?)
            .await?;
        self.pods.push((namespace.clone(), pod.name.clone()));
        info!("Deployed {} FRR pod {} on {}", pod.role, pod.name, pod.node);

        wait_object(&self.store, &namespace, &pod.name, self.params.ready, &self.cancel, is_pod_ready).await?;
        let pod_ref = PodRef::new(&namespace, &pod.name, Some(FRR_CONTAINER));
        let frr = FrrPod::new(&self.store, pod_ref.clone());
        wait_for(&Responds(&frr), self.params.ready, &self.cancel).await?;
        Ok(pod_ref)
    }

    /// Install `routes` in every pod of `pods` (speakers or external routers) and record them
    pub async fn add_routes(
        &mut self,
        pods: &[PodRef],
        routes: &[StaticRoute],
    ) -> Result<(), MgmtError> {
        for pod in pods {
            for route in routes {
                self.routes.install(&self.store, pod, route).await?;
            }
        }
        info!("Installed {} routes in {} pods", routes.len(), pods.len());
        Ok(())
    }

    /// Delete recorded objects, latest first. Those deleted are forgotten.
    async fn delete_recorded<K: Namespaced>(
        &self,
        recorded: &mut Vec<(String, String)>,
        wait: bool,
        failures: &mut Vec<MgmtError>,
    ) {
        let cancel = CancellationToken::new();
        let mut kept = vec![];
        while let Some((namespace, name)) = recorded.pop() {
            let mut result = self.store.delete_in::<K>(&namespace, &name).await;
            if wait && result.is_ok() {
                result = wait_gone::<_, K>(&self.store, &namespace, &name, self.params.teardown, &cancel).await;
            }
            if let Err(e) = result {
                warn!("Teardown: {e}");
                failures.push(e.into());
                kept.push((namespace, name));
            }
        }
        kept.reverse();
        *recorded = kept;
    }

    /// Remove everything the harness created. Every step runs even if an earlier one
    /// failed; failures are returned as warnings. What could not be removed stays recorded,
    /// so a second teardown retries it and is a no-op otherwise.
    pub async fn teardown(&mut self) -> Vec<MgmtError> {
        let mut failures = self.routes.remove_all(&self.store).await;
        let mut pods = std::mem::take(&mut self.pods);
        self.delete_recorded::<Pod>(&mut pods, true, &mut failures).await;
        self.pods = pods;
        let mut nads = std::mem::take(&mut self.nads);
        self.delete_recorded::<NetworkAttachmentDefinition>(&mut nads, false, &mut failures)
            .await;
        self.nads = nads;
        let mut configmaps = std::mem::take(&mut self.configmaps);
        self.delete_recorded::<ConfigMap>(&mut configmaps, false, &mut failures)
            .await;
        self.configmaps = configmaps;
        if failures.is_empty() {
            debug!("External FRR harness torn down");
        }
        failures
    }
}
