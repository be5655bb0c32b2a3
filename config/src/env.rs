// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Suite environment configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file named by
//! `METALLB_E2E_CONFIG`, then `ECO_METALLB_*` environment variables. A `.env` file in the
//! working directory is loaded first, if present.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ConfigError;

const DEFAULTS: &str = include_str!("defaults.yaml");

/// Environment variable naming an optional YAML file overriding the defaults
pub const CONFIG_FILE_VAR: &str = "METALLB_E2E_CONFIG";

/// Prefix of all environment overrides
pub const ENV_PREFIX: &str = "ECO_METALLB_";

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SwitchCredentials {
    pub user: Option<String>,
    pub password: Option<String>,
    pub address: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EnvConfig {
    pub kubeconfig: Option<PathBuf>,
    pub operator_namespace: String,
    pub frrk8s_namespace: String,
    /// namespace hosting the external FRR pods and their NADs and configmaps
    pub test_namespace: String,
    pub worker_label: BTreeMap<String, String>,
    pub control_plane_label: BTreeMap<String, String>,
    /// addresses of the external FRR pods, as seen by the speakers
    pub external_ips_v4: Vec<IpAddr>,
    pub external_ips_v6: Vec<IpAddr>,
    /// addresses of the cluster nodes on the external network
    pub node_addresses_v4: Vec<IpAddr>,
    pub node_addresses_v6: Vec<IpAddr>,
    pub vlan: Option<u16>,
    pub sriov_interfaces: Vec<String>,
    /// node interface the macvlan attachments of external FRR pods hang from
    pub external_interface: Option<String>,
    pub frr_image: String,
    pub metallb_asn: u32,
    pub external_asn: u32,
    pub switch: SwitchCredentials,
    pub report_dir: Option<PathBuf>,
    /// tracing setup string, e.g. `default=info,observer=debug`
    pub log: Option<String>,
}

fn parse_list<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<Vec<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .map_err(|e| ConfigError::InvalidValue(name, format!("{s}: {e}")))
        })
        .collect()
}

/// Parse `key=value,key2=value2`. A bare `key` maps to an empty value.
fn parse_map(value: &str) -> BTreeMap<String, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.split_once('=') {
            Some((k, v)) => (k.trim().to_string(), v.trim().to_string()),
            None => (s.to_string(), String::new()),
        })
        .collect()
}

fn parse_scalar<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name, format!("{value}: {e}")))
}

impl EnvConfig {
    /// Load the configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        let mut config = match std::env::var(CONFIG_FILE_VAR) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::defaults()?,
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        if config.kubeconfig.is_none() {
            config.kubeconfig = std::env::var("KUBECONFIG").ok().map(PathBuf::from);
        }
        Ok(config)
    }

    /// The built-in defaults
    pub fn defaults() -> Result<Self, ConfigError> {
        serde_yaml_ng::from_str(DEFAULTS).map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Read a YAML file. Keys absent from the file keep their default value.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("Failed to read {path}: {e}")))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let mut merged: serde_yaml_ng::Value = serde_yaml_ng::from_str(DEFAULTS)
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        let overrides: serde_yaml_ng::Value =
            serde_yaml_ng::from_str(text).map_err(|e| ConfigError::Load(e.to_string()))?;
        if let (Some(base), serde_yaml_ng::Value::Mapping(over)) = (merged.as_mapping_mut(), overrides) {
            for (k, v) in over {
                base.insert(k, v);
            }
        }
        serde_yaml_ng::from_value(merged).map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Apply `ECO_METALLB_*` overrides. `lookup` resolves a variable name to its value.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        if let Some(v) = var("KUBECONFIG") {
            self.kubeconfig = Some(PathBuf::from(v));
        }
        if let Some(v) = var("OPERATOR_NAMESPACE") {
            self.operator_namespace = v;
        }
        if let Some(v) = var("FRRK8S_NAMESPACE") {
            self.frrk8s_namespace = v;
        }
        if let Some(v) = var("TEST_NAMESPACE") {
            self.test_namespace = v;
        }
        if let Some(v) = var("WORKER_LABEL") {
            self.worker_label = parse_map(&v);
        }
        if let Some(v) = var("CONTROL_PLANE_LABEL") {
            self.control_plane_label = parse_map(&v);
        }
        if let Some(v) = var("IPS_V4") {
            self.external_ips_v4 = parse_list("external_ips_v4", &v)?;
        }
        if let Some(v) = var("IPS_V6") {
            self.external_ips_v6 = parse_list("external_ips_v6", &v)?;
        }
        if let Some(v) = var("NODE_ADDRESSES_V4") {
            self.node_addresses_v4 = parse_list("node_addresses_v4", &v)?;
        }
        if let Some(v) = var("NODE_ADDRESSES_V6") {
            self.node_addresses_v6 = parse_list("node_addresses_v6", &v)?;
        }
        if let Some(v) = var("VLAN") {
            self.vlan = Some(parse_scalar("vlan", &v)?);
        }
        if let Some(v) = var("SRIOV_INTERFACES") {
            self.sriov_interfaces = parse_list("sriov_interfaces", &v)?;
        }
        if let Some(v) = var("EXTERNAL_INTERFACE") {
            self.external_interface = Some(v);
        }
        if let Some(v) = var("FRR_IMAGE") {
            self.frr_image = v;
        }
        if let Some(v) = var("ASN") {
            self.metallb_asn = parse_scalar("metallb_asn", &v)?;
        }
        if let Some(v) = var("EXTERNAL_ASN") {
            self.external_asn = parse_scalar("external_asn", &v)?;
        }
        if let Some(v) = var("SWITCH_USER") {
            self.switch.user = Some(v);
        }
        if let Some(v) = var("SWITCH_PASS") {
            self.switch.password = Some(v);
        }
        if let Some(v) = var("SWITCH_IP") {
            self.switch.address = Some(v);
        }
        if let Some(v) = var("SWITCH_INTERFACES") {
            self.switch.interfaces = parse_list("switch_interfaces", &v)?;
        }
        if let Some(v) = var("REPORT_DIR") {
            self.report_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("LOG") {
            self.log = Some(v);
        }
        Ok(())
    }

    /// External FRR addresses of the requested family, or an unmet precondition
    pub fn require_external_ips(&self, ipv6: bool) -> Result<&[IpAddr], ConfigError> {
        let ips = if ipv6 {
            &self.external_ips_v6
        } else {
            &self.external_ips_v4
        };
        if ips.is_empty() {
            let family = if ipv6 { "IPv6" } else { "IPv4" };
            return Err(ConfigError::Unmet(format!(
                "no {family} external FRR addresses configured"
            )));
        }
        Ok(ips)
    }

    /// Node addresses of the requested family on the external network
    pub fn require_node_addresses(&self, ipv6: bool) -> Result<&[IpAddr], ConfigError> {
        let ips = if ipv6 {
            &self.node_addresses_v6
        } else {
            &self.node_addresses_v4
        };
        if ips.is_empty() {
            let family = if ipv6 { "IPv6" } else { "IPv4" };
            return Err(ConfigError::Unmet(format!(
                "no {family} node addresses configured"
            )));
        }
        Ok(ips)
    }

    pub fn require_external_interface(&self) -> Result<&str, ConfigError> {
        self.external_interface
            .as_deref()
            .ok_or_else(|| ConfigError::Unmet("no external interface configured".to_string()))
    }

    pub fn require_switch(&self) -> Result<&SwitchCredentials, ConfigError> {
        match (&self.switch.user, &self.switch.password, &self.switch.address) {
            (Some(_), Some(_), Some(_)) => Ok(&self.switch),
            _ => Err(ConfigError::Unmet(
                "lab switch credentials are not configured".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EnvConfig::defaults().unwrap();
        assert_eq!(config.operator_namespace, "metallb-system");
        assert_eq!(config.frrk8s_namespace, "openshift-frr-k8s");
        assert_eq!(config.worker_label.len(), 1);
        assert!(config.external_ips_v4.is_empty());
        assert_eq!(config.metallb_asn, 64500);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ECO_METALLB_IPS_V4", "10.46.56.131, 10.46.56.132"),
            ("ECO_METALLB_WORKER_LABEL", "node-role.kubernetes.io/worker,zone=a"),
            ("ECO_METALLB_VLAN", "108"),
            ("ECO_METALLB_SWITCH_INTERFACES", "et-0/0/16,et-0/0/17"),
        ]
        .into_iter()
        .collect();
        let mut config = EnvConfig::defaults().unwrap();
        config
            .apply_env(|name| vars.get(name).map(ToString::to_string))
            .unwrap();
        assert_eq!(
            config.external_ips_v4,
            vec![
                "10.46.56.131".parse::<IpAddr>().unwrap(),
                "10.46.56.132".parse::<IpAddr>().unwrap()
            ]
        );
        assert_eq!(config.worker_label["zone"], "a");
        assert_eq!(config.worker_label["node-role.kubernetes.io/worker"], "");
        assert_eq!(config.vlan, Some(108));
        assert_eq!(config.switch.interfaces.len(), 2);
        assert!(config.require_external_ips(false).is_ok());
        assert!(matches!(
            config.require_external_ips(true),
            Err(ConfigError::Unmet(_))
        ));
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = EnvConfig::defaults().unwrap();
        let err = config
            .apply_env(|name| (name == "ECO_METALLB_IPS_V6").then(|| "2001:db8::zz".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("external_ips_v6", _)));
    }

    #[test]
    fn test_yaml_overrides_keep_defaults() {
        let config = EnvConfig::from_yaml(
            "operator_namespace: metallb\nexternal_ips_v6: ['2001:db8::1']\n",
        )
        .unwrap();
        assert_eq!(config.operator_namespace, "metallb");
        assert_eq!(config.frrk8s_namespace, "openshift-frr-k8s");
        assert_eq!(config.external_ips_v6.len(), 1);
        assert!(EnvConfig::from_yaml("no_such_key: 1\n").is_err());
    }

    #[test]
    fn test_switch_precondition() {
        let mut config = EnvConfig::defaults().unwrap();
        assert!(config.require_switch().is_err());
        config.switch.user = Some("admin".into());
        config.switch.password = Some("secret".into());
        config.switch.address = Some("10.1.1.1".into());
        assert!(config.require_switch().is_ok());
    }
}
