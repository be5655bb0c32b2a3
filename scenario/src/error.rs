// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use config::ConfigError;
use k8s_intf::GatewayError;
use mgmt::MgmtError;
use observer::ObserveError;
use topology::TopologyError;

/// Why a scenario did not pass
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// a precondition is unmet: the scenario is skipped, not failed
    #[error("Skipped: {0}")]
    Skip(String),
    #[error("Setup failed: {0}")]
    Setup(String),
    /// a condition did not hold in time, with the last observed state
    #[error("Verification failed: {0}")]
    Verify(String),
    #[error("Cancelled: {0}")]
    Cancelled(String),
    #[error("Lab switch error: {0}")]
    Switch(String),
}

impl ScenarioError {
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, ScenarioError::Skip(_))
    }
}

impl From<ConfigError> for ScenarioError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Unmet(reason) => ScenarioError::Skip(reason),
            e => ScenarioError::Setup(e.to_string()),
        }
    }
}

impl From<TopologyError> for ScenarioError {
    fn from(e: TopologyError) -> Self {
        ScenarioError::Setup(e.to_string())
    }
}

impl From<GatewayError> for ScenarioError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Cancelled(what) => ScenarioError::Cancelled(what),
            e => ScenarioError::Setup(e.to_string()),
        }
    }
}

impl From<ObserveError> for ScenarioError {
    fn from(e: ObserveError) -> Self {
        match e {
            ObserveError::Cancelled(what) => ScenarioError::Cancelled(what),
            e @ (ObserveError::Timeout { .. } | ObserveError::Parse { .. }) => {
                ScenarioError::Verify(e.to_string())
            }
            e => ScenarioError::Setup(e.to_string()),
        }
    }
}

impl From<MgmtError> for ScenarioError {
    fn from(e: MgmtError) -> Self {
        match e {
            MgmtError::Config(e) => e.into(),
            MgmtError::Gateway(e) => e.into(),
            MgmtError::Observe(e) => e.into(),
            e => ScenarioError::Setup(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_conversions() {
        let skip = ScenarioError::from(ConfigError::Unmet("no ipv6 addresses".into()));
        assert!(skip.is_skip());
        let timeout = ScenarioError::from(ObserveError::Timeout {
            what: "sessions up".into(),
            timeout: Duration::from_secs(60),
            last: "10.0.0.2=Active".into(),
        });
        assert!(matches!(timeout, ScenarioError::Verify(ref m) if m.contains("10.0.0.2=Active")));
        let cancelled = ScenarioError::from(MgmtError::Gateway(GatewayError::Cancelled("pod".into())));
        assert!(matches!(cancelled, ScenarioError::Cancelled(_)));
    }
}
