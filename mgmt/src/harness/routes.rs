// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Static routes installed in speaker pods, and the bookkeeping to remove them

use k8s_intf::{GatewayError, PodExec, PodRef};
use topology::StaticRoute;
#[allow(unused)]
use tracing::{debug, info, warn};

use crate::MgmtError;

/// A route installed in a pod
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    pub pod: PodRef,
    pub route: StaticRoute,
}

/// Routes installed by a scenario. Teardown walks this list rather than the pods the
/// scenario currently knows about.
#[derive(Debug, Default)]
pub struct RouteBook {
    /// installed and not removed yet
    entries: Vec<RouteEntry>,
    /// everything ever installed, to check pods against after teardown
    installed: Vec<RouteEntry>,
}

/// Run an `ip route` command. Failures leaving the route in the wanted state succeed.
async fn run_route_command(
    exec: &dyn PodExec,
    pod: &PodRef,
    route: &StaticRoute,
    command: &[String],
) -> Result<(), MgmtError> {
    match exec.exec(pod, command).await {
        Ok(_) => Ok(()),
        Err(GatewayError::ExecFailed { output, .. }) if StaticRoute::is_idempotent_failure(&output) => {
            debug!("{pod}: {}: {}", command.join(" "), output.trim());
            Ok(())
        }
        Err(e) => Err(MgmtError::Route {
            pod: pod.to_string(),
            route: route.to_string(),
            reason: e.to_string(),
        }),
    }
}

impl RouteBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Install `route` in `pod` and record it
    pub async fn install(
        &mut self,
        exec: &dyn PodExec,
        pod: &PodRef,
        route: &StaticRoute,
    ) -> Result<(), MgmtError> {
        run_route_command(exec, pod, route, &route.add_command()).await?;
        let entry = RouteEntry {
            pod: pod.clone(),
            route: route.clone(),
        };
        if !self.installed.contains(&entry) {
            self.installed.push(entry.clone());
        }
        if !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
        Ok(())
    }

    /// Remove every recorded route, latest first. Failures are logged and returned; the
    /// routes that could not be removed stay recorded.
    pub async fn remove_all(&mut self, exec: &dyn PodExec) -> Vec<MgmtError> {
        let mut failures = vec![];
        let mut kept = vec![];
        while let Some(entry) = self.entries.pop() {
            match run_route_command(exec, &entry.pod, &entry.route, &entry.route.del_command()).await {
                Ok(()) => debug!(
                    "Removed route to {} from {}",
                    entry.route.destination, entry.pod
                ),
                Err(e) => {
                    warn!("{e}");
                    failures.push(e);
                    kept.push(entry);
                }
            }
        }
        kept.reverse();
        self.entries = kept;
        failures
    }

    /// Every route ever installed that its pod still lists. Pods that are gone hold no route.
    pub async fn left_behind(&self, exec: &dyn PodExec) -> Result<Vec<RouteEntry>, MgmtError> {
        let mut left = vec![];
        for entry in &self.installed {
            match exec.exec(&entry.pod, &entry.route.show_command()).await {
                Ok(output) if entry.route.is_listed_in(&output.stdout) => left.push(entry.clone()),
                Ok(_) => {}
                Err(e) if e.is_not_found() => debug!("{} is gone", entry.pod),
                Err(e) => {
                    return Err(MgmtError::Route {
                        pod: entry.pod.to_string(),
                        route: entry.route.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(left)
    }
}
