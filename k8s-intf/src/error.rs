// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::time::Duration;

/// API status codes worth retrying
const TRANSIENT_CODES: [u16; 6] = [409, 429, 500, 502, 503, 504];

/// How a failure should be handled by a polling loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// retry within the polling deadline
    Transient,
    /// abort the step
    Fatal,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Client error: {0}")]
    ClientError(#[from] kube::Error),
    #[error("Failed to load kubeconfig: {0}")]
    Kubeconfig(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Call '{0}' did not complete within {1:?}")]
    Deadline(String, Duration),
    #[error("Command '{command}' in pod {pod} failed ({status}): {output}")]
    ExecFailed {
        pod: String,
        command: String,
        status: String,
        output: String,
    },
    #[error("Exec stream error in pod {0}: {1}")]
    ExecStream(String, String),
    #[error("Timed out after {1:?} waiting for {0}")]
    WaitTimeout(String, Duration),
    #[error("Cancelled while waiting for {0}")]
    Cancelled(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Class of an API status code
#[must_use]
pub fn classify_code(code: u16) -> ErrorClass {
    if TRANSIENT_CODES.contains(&code) {
        ErrorClass::Transient
    } else {
        ErrorClass::Fatal
    }
}

impl GatewayError {
    /// HTTP status of a failed API call
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        match self {
            GatewayError::ClientError(kube::Error::Api(status)) => Some(status.code),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_)) || self.code() == Some(404)
    }

    /// Rejected by the API server or an admission webhook
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self.code(), Some(400 | 403 | 422))
    }

    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            GatewayError::ClientError(kube::Error::Api(status)) => classify_code(status.code),
            GatewayError::ClientError(kube::Error::SerdeError(_)) => ErrorClass::Fatal,
            // everything else from the client is a transport failure
            GatewayError::ClientError(_)
            | GatewayError::Deadline(..)
            | GatewayError::ExecFailed { .. }
            | GatewayError::ExecStream(..) => ErrorClass::Transient,
            GatewayError::Kubeconfig(_)
            | GatewayError::NotFound(_)
            | GatewayError::WaitTimeout(..)
            | GatewayError::Cancelled(_)
            | GatewayError::SerializationError(_) => ErrorClass::Fatal,
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_code() {
        for code in [409, 429, 500, 502, 503, 504] {
            assert_eq!(classify_code(code), ErrorClass::Transient, "{code}");
        }
        for code in [400, 401, 403, 404, 422] {
            assert_eq!(classify_code(code), ErrorClass::Fatal, "{code}");
        }
    }

    #[test]
    fn test_class() {
        let deadline = GatewayError::Deadline("get pod".into(), Duration::from_secs(30));
        assert!(deadline.is_transient());
        let failed = GatewayError::ExecFailed {
            pod: "frr".into(),
            command: "vtysh -c 'show version'".into(),
            status: "exit code 1".into(),
            output: String::new(),
        };
        assert!(failed.is_transient());
        let missing = GatewayError::NotFound("pod frr".into());
        assert_eq!(missing.class(), ErrorClass::Fatal);
        assert!(missing.is_not_found());
        assert_eq!(missing.code(), None);
    }
}
