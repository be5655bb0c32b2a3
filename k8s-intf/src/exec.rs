// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Running commands inside pods

use std::fmt::Display;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use kube::api::AttachParams;
use tokio::io::{AsyncRead, AsyncReadExt};
#[allow(unused)]
use tracing::{debug, trace};

use crate::client::Gateway;
use crate::error::GatewayError;

/// A container of a pod commands are run in
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
    /// first container of the pod when unset
    pub container: Option<String>,
}

impl PodRef {
    #[must_use]
    pub fn new(namespace: &str, name: &str, container: Option<&str>) -> Self {
        Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            container: container.map(ToOwned::to_owned),
        }
    }

    /// Reference a container of a pod returned by the API
    #[must_use]
    pub fn of(pod: &Pod, container: Option<&str>) -> Self {
        Self::new(
            &pod.namespace().unwrap_or_default(),
            &pod.name_any(),
            container,
        )
    }
}

impl Display for PodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)?;
        if let Some(container) = &self.container {
            write!(f, "[{container}]")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Build a command line from string slices
#[must_use]
pub fn command(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_owned()).collect()
}

/// Run a command in a pod. A command exiting with a non-zero status is an error carrying
/// the command's output.
#[async_trait]
pub trait PodExec: Send + Sync {
    async fn exec(&self, pod: &PodRef, command: &[String]) -> Result<ExecOutput, GatewayError>;
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<String> {
    let mut out = String::new();
    if let Some(mut reader) = reader {
        reader.read_to_string(&mut out).await?;
    }
    Ok(out)
}

impl Gateway {
    async fn exec_inner(&self, pod: &PodRef, command: &[String]) -> Result<ExecOutput, GatewayError> {
        let api = self.namespaced::<Pod>(&pod.namespace);
        let mut params = AttachParams::default().stdin(false).stdout(true).stderr(true);
        if let Some(container) = &pod.container {
            params = params.container(container.clone());
        }
        let mut process = api.exec(&pod.name, command.to_vec(), &params).await?;
        let stdout = process.stdout();
        let stderr = process.stderr();
        let status = process.take_status();
        let (stdout, stderr) = tokio::join!(read_all(stdout), read_all(stderr));
        let stream_error = |e: std::io::Error| GatewayError::ExecStream(pod.to_string(), e.to_string());
        let output = ExecOutput {
            stdout: stdout.map_err(stream_error)?,
            stderr: stderr.map_err(stream_error)?,
        };
        let status = match status {
            Some(status) => status.await,
            None => None,
        };
        process
            .join()
            .await
            .map_err(|e| GatewayError::ExecStream(pod.to_string(), e.to_string()))?;

        match status {
            Some(status) if status.status.as_deref() == Some("Failure") => {
                Err(GatewayError::ExecFailed {
                    pod: pod.to_string(),
                    command: command.join(" "),
                    status: status.message.unwrap_or_default(),
                    output: format!("{}{}", output.stdout, output.stderr),
                })
            }
            _ => Ok(output),
        }
    }
}

#[async_trait]
impl PodExec for Gateway {
    async fn exec(&self, pod: &PodRef, command: &[String]) -> Result<ExecOutput, GatewayError> {
        trace!("exec in {pod}: {}", command.join(" "));
        let what = format!("exec in {pod}");
        match tokio::time::timeout(self.call_timeout(), self.exec_inner(pod, command)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Deadline(what, self.call_timeout())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_ref_display() {
        let pod = PodRef::new("metallb-tests", "frr-master", Some("frr"));
        assert_eq!(pod.to_string(), "metallb-tests/frr-master[frr]");
        assert_eq!(
            PodRef::new("ns", "p", None).to_string(),
            "ns/p"
        );
        assert_eq!(command(&["vtysh", "-c", "show version"]).len(), 3);
    }
}
