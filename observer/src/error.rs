// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::time::Duration;

use k8s_intf::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum ObserveError {
    #[error("Failed to parse output of '{command}': {reason}\n{raw}")]
    Parse {
        command: String,
        reason: String,
        raw: String,
    },
    #[error("Command '{0}' produced no output")]
    EmptyOutput(String),
    #[error("Timed out after {timeout:?} waiting for {what}; last observed: {last}")]
    Timeout {
        what: String,
        timeout: Duration,
        last: String,
    },
    #[error("Cancelled while waiting for {0}")]
    Cancelled(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ObserveError {
    /// Errors a polling loop keeps retrying on
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ObserveError::EmptyOutput(_) => true,
            ObserveError::Gateway(e) => e.is_transient(),
            ObserveError::Parse { .. }
            | ObserveError::Timeout { .. }
            | ObserveError::Cancelled(_) => false,
        }
    }
}
