// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use k8s_openapi::api::core::v1::Pod;
use kube::api::LogParams;

use crate::client::Gateway;
use crate::error::GatewayError;
use crate::exec::PodRef;

/// Tell if the pod is running with its `Ready` condition true
#[must_use]
pub fn is_pod_ready(pod: &Pod) -> bool {
    let Some(status) = &pod.status else {
        return false;
    };
    status.phase.as_deref() == Some("Running")
        && status
            .conditions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|c| c.type_ == "Ready" && c.status == "True")
}

/// Name of the node the pod is scheduled on
#[must_use]
pub fn pod_node(pod: &Pod) -> Option<&str> {
    pod.spec.as_ref()?.node_name.as_deref()
}

impl Gateway {
    pub async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>, GatewayError> {
        self.list(&self.namespaced::<Pod>(namespace), label_selector)
            .await
    }

    /// Whole log of a container
    pub async fn full_log(&self, pod: &PodRef) -> Result<String, GatewayError> {
        let api = self.namespaced::<Pod>(&pod.namespace);
        let params = LogParams {
            container: pod.container.clone(),
            ..Default::default()
        };
        self.call(&format!("logs of {pod}"), api.logs(&pod.name, &params))
            .await
    }
}
