// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Kubernetes objects of an external FRR pod

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Capabilities, ConfigMap, ConfigMapVolumeSource, Container, Pod, PodSpec, SecurityContext,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_types::nad::NETWORKS_ANNOTATION;
use topology::pod::FRR_CONFIG_DIR;
use topology::{ExternalFrrPod, TopologyError};

/// Label put on everything the harness creates
pub const APP_LABEL: (&str, &str) = ("app", "metallb-e2e-frr");
pub const ROLE_LABEL: &str = "metallb-e2e/role";
/// Container running FRR in the external pods
pub const FRR_CONTAINER: &str = "frr";
const CONFIG_VOLUME: &str = "frr-config";
const CAPABILITIES: [&str; 3] = ["NET_ADMIN", "NET_RAW", "SYS_ADMIN"];

fn metadata(pod: &ExternalFrrPod, name: String, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(namespace.to_string()),
        labels: Some(BTreeMap::from([
            (APP_LABEL.0.to_string(), APP_LABEL.1.to_string()),
            (ROLE_LABEL.to_string(), pod.role.to_string()),
        ])),
        ..Default::default()
    }
}

/// Configmap carrying `frr.conf`, `daemons` and `vtysh.conf`
#[must_use]
pub fn frr_configmap(pod: &ExternalFrrPod, namespace: &str) -> ConfigMap {
    ConfigMap {
        metadata: metadata(pod, pod.configmap_name(), namespace),
        data: Some(pod.config_files()),
        ..Default::default()
    }
}

/// Privileged pod pinned to its node, with the configmap mounted over the FRR configuration
/// directory and its secondary networks attached with static addresses
pub fn frr_pod(pod: &ExternalFrrPod, namespace: &str, image: &str) -> Result<Pod, TopologyError> {
    let mut meta = metadata(pod, pod.name.clone(), namespace);
    if !pod.interfaces.is_empty() {
        meta.annotations = Some(BTreeMap::from([(
            NETWORKS_ANNOTATION.to_string(),
            pod.networks_annotation()?,
        )]));
    }
    let container = Container {
        name: FRR_CONTAINER.to_string(),
        image: Some(image.to_string()),
        security_context: Some(SecurityContext {
            privileged: Some(true),
            capabilities: Some(Capabilities {
                add: Some(CAPABILITIES.iter().map(ToString::to_string).collect()),
                drop: None,
            }),
            ..Default::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: CONFIG_VOLUME.to_string(),
            mount_path: FRR_CONFIG_DIR.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };
    Ok(Pod {
        metadata: meta,
        spec: Some(PodSpec {
            node_name: Some(pod.node.clone()),
            containers: vec![container],
            volumes: Some(vec![Volume {
                name: CONFIG_VOLUME.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: pod.configmap_name(),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            termination_grace_period_seconds: Some(0),
            ..Default::default()
        }),
        ..Default::default()
    })
}
