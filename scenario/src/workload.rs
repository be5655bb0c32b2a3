// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Load balancer services whose addresses MetalLB advertises, and the pods backing them

use std::collections::BTreeMap;

use config::model::IpStack;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// Label of every workload object, used to delete them all at teardown
pub const WORKLOAD_LABEL: (&str, &str) = ("metallb-e2e/workload", "true");
/// Pool the service takes its address from
pub const ADDRESS_POOL_ANNOTATION: &str = "metallb.io/address-pool";
const BACKEND_LABEL: &str = "metallb-e2e/backend";
const PORT: i32 = 8080;

#[must_use]
pub fn workload_selector() -> String {
    format!("{}={}", WORKLOAD_LABEL.0, WORKLOAD_LABEL.1)
}

fn labels(backend: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (WORKLOAD_LABEL.0.to_string(), WORKLOAD_LABEL.1.to_string()),
        (BACKEND_LABEL.to_string(), backend.to_string()),
    ])
}

/// A `LoadBalancer` service taking its address from `pool`, selecting the backend `name`
#[must_use]
pub fn load_balancer(name: &str, namespace: &str, pool: &str, stack: IpStack) -> Service {
    let (policy, families) = match stack {
        IpStack::V4 => ("SingleStack", vec!["IPv4"]),
        IpStack::V6 => ("SingleStack", vec!["IPv6"]),
        IpStack::Dual => ("RequireDualStack", vec!["IPv4", "IPv6"]),
    };
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(name)),
            annotations: Some(BTreeMap::from([(
                ADDRESS_POOL_ANNOTATION.to_string(),
                pool.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            external_traffic_policy: Some("Cluster".to_string()),
            ip_family_policy: Some(policy.to_string()),
            ip_families: Some(families.into_iter().map(String::from).collect()),
            selector: Some(BTreeMap::from([(BACKEND_LABEL.to_string(), name.to_string())])),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: PORT,
                target_port: Some(IntOrString::Int(PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Pod answering for the service `name`
#[must_use]
pub fn backend(name: &str, namespace: &str, image: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(format!("{name}-backend")),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(name)),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "backend".to_string(),
                image: Some(image.to_string()),
                command: Some(vec!["sleep".to_string(), "infinity".to_string()]),
                ..Default::default()
            }],
            termination_grace_period_seconds: Some(0),
            ..Default::default()
        }),
        ..Default::default()
    }
}
