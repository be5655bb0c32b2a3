// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Dumps of the BGP resources of the cluster, written when a scenario fails

use std::path::{Path, PathBuf};

use k8s_intf::{Gateway, Object, PodRef};
use k8s_types::frrk8s::{FRRConfiguration, FRRNodeState};
use k8s_types::metallb::{BFDProfile, BGPAdvertisement, BGPPeer, BGPSessionState, IPAddressPool};
use k8s_types::ovn::RouteAdvertisements;
use kube::{Api, Resource};
#[allow(unused)]
use tracing::{debug, info, warn};

/// Where to dump and from which namespaces
#[derive(Clone, Debug)]
pub struct Reporter {
    pub dir: PathBuf,
    pub operator_namespace: String,
    pub frr_namespace: String,
}

/// Directory of a scenario's dumps. Characters that cannot appear in a file name are replaced.
#[must_use]
pub fn scenario_dir(base: &Path, scenario: &str) -> PathBuf {
    let name: String = scenario
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    base.join(name)
}

/// Render objects as one YAML document per object. Managed fields are noise and dropped.
pub fn render_yaml<K: Object>(objects: &[K]) -> Result<String, serde_yaml_ng::Error> {
    let mut out = String::new();
    for obj in objects {
        let mut obj = obj.clone();
        obj.meta_mut().managed_fields = None;
        out += "---\n";
        out += &serde_yaml_ng::to_string(&obj)?;
    }
    Ok(out)
}

impl Reporter {
    async fn dump<K: Object>(&self, gw: &Gateway, api: &Api<K>, dir: &Path) -> Result<PathBuf, String> {
        let kind = K::plural(&()).to_string();
        let objects = gw.list(api, None).await.map_err(|e| format!("{kind}: {e}"))?;
        let text = render_yaml(&objects).map_err(|e| format!("{kind}: {e}"))?;
        let path = dir.join(format!("{kind}.yaml"));
        tokio::fs::write(&path, text)
            .await
            .map_err(|e| format!("{}: {e}", path.display()))?;
        debug!("Dumped {} {kind} to {}", objects.len(), path.display());
        Ok(path)
    }

    /// Dump every kind to `<dir>/<scenario>/<kind>.yaml`. Returns one warning per failed dump.
    pub async fn report(&self, gw: &Gateway, scenario: &str) -> Vec<String> {
        let dir = scenario_dir(&self.dir, scenario);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            return vec![format!("report directory {}: {e}", dir.display())];
        }
        let ns = self.operator_namespace.as_str();
        let frr_ns = self.frr_namespace.as_str();
        let results = [
            self.dump(gw, &gw.namespaced::<BGPPeer>(ns), &dir).await,
            self.dump(gw, &gw.namespaced::<BGPAdvertisement>(ns), &dir).await,
            self.dump(gw, &gw.namespaced::<IPAddressPool>(ns), &dir).await,
            self.dump(gw, &gw.namespaced::<BFDProfile>(ns), &dir).await,
            self.dump(gw, &gw.namespaced::<BGPSessionState>(ns), &dir).await,
            self.dump(gw, &gw.namespaced::<FRRConfiguration>(frr_ns), &dir).await,
            self.dump(gw, &gw.cluster::<FRRNodeState>(), &dir).await,
            self.dump(gw, &gw.cluster::<RouteAdvertisements>(), &dir).await,
        ];
        let warnings: Vec<String> = results
            .into_iter()
            .filter_map(Result::err)
            .map(|e| format!("report: {e}"))
            .collect();
        info!(
            "Report of {scenario} written to {} ({} failed dumps)",
            dir.display(),
            warnings.len()
        );
        warnings
    }

    /// Save the logs of `pods` next to the dumps, as `<pod>.log`
    pub async fn logs(&self, gw: &Gateway, scenario: &str, pods: &[PodRef]) -> Vec<String> {
        let dir = scenario_dir(&self.dir, scenario);
        let mut warnings = vec![];
        for pod in pods {
            let path = dir.join(format!("{}.log", pod.name));
            let result = match gw.full_log(pod).await {
                Ok(log) => tokio::fs::write(&path, log).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(e) = result {
                warnings.push(format!("report: log of {pod}: {e}"));
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_types::metallb::IPAddressPoolSpec;
    use kube::api::ObjectMeta;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ManagedFieldsEntry;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scenario_dir() {
        assert_eq!(
            scenario_dir(Path::new("/tmp/reports"), "session down/restore"),
            PathBuf::from("/tmp/reports/session_down_restore")
        );
    }

    #[test]
    fn test_render_drops_managed_fields() {
        let mut pool = IPAddressPool::new(
            "p1",
            IPAddressPoolSpec {
                addresses: vec!["192.168.100.0/28".to_string()],
                ..Default::default()
            },
        );
        pool.metadata = ObjectMeta {
            name: Some("p1".to_string()),
            namespace: Some("metallb-system".to_string()),
            managed_fields: Some(vec![ManagedFieldsEntry::default()]),
            ..Default::default()
        };
        let yaml = render_yaml(&[pool]).unwrap();
        assert!(yaml.starts_with("---\n"));
        assert!(yaml.contains("192.168.100.0/28"));
        assert!(!yaml.contains("managedFields"));
        assert_eq!(render_yaml::<IPAddressPool>(&[]).unwrap(), "");
    }
}
