// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Queries and session control on an FRR instance through `vtysh`

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use config::model::Family;
use k8s_intf::{PodExec, PodRef};
use serde::de::DeserializeOwned;
#[allow(unused)]
use tracing::{debug, trace, warn};

use crate::error::ObserveError;
use crate::frr::{
    AdvertisedRoutes, BgpSummary, BgpTable, NeighborState, PrefixAttributes, PrefixDetail,
    neighbor_detail, parse_json,
};

const VTYSH: &str = "vtysh";

/// An FRR instance running in a pod: an external FRR pod or a speaker's frr container
pub struct FrrPod<'a> {
    exec: &'a dyn PodExec,
    pod: PodRef,
}

impl<'a> FrrPod<'a> {
    #[must_use]
    pub fn new(exec: &'a dyn PodExec, pod: PodRef) -> Self {
        Self { exec, pod }
    }

    #[must_use]
    pub fn pod(&self) -> &PodRef {
        &self.pod
    }

    /// Run `vtysh` with one `-c` per command
    pub async fn vtysh(&self, commands: &[&str]) -> Result<String, ObserveError> {
        let mut argv = vec![VTYSH.to_string()];
        for c in commands {
            argv.push("-c".to_string());
            argv.push((*c).to_string());
        }
        let output = self.exec.exec(&self.pod, &argv).await?;
        trace!("{}: {} -> {} bytes", self.pod, commands.join(" / "), output.stdout.len());
        Ok(output.stdout)
    }

    /// Run a JSON command. Empty output is reported as such so pollers retry it.
    async fn json<T: DeserializeOwned>(&self, command: &str) -> Result<T, ObserveError> {
        let raw = self.vtysh(&[command]).await?;
        parse_json(command, &raw)?.ok_or_else(|| ObserveError::EmptyOutput(command.to_string()))
    }

    pub async fn bgp_summary(&self) -> Result<BgpSummary, ObserveError> {
        self.json("show bgp summary json").await
    }

    /// State and negotiated timers of a neighbor. `None` when FRR does not know it.
    pub async fn neighbor_state(&self, neighbor: IpAddr) -> Result<Option<NeighborState>, ObserveError> {
        let command = format!("show bgp neighbor {neighbor} json");
        let raw = self.vtysh(&[&command]).await?;
        if raw.trim().is_empty() {
            return Err(ObserveError::EmptyOutput(command));
        }
        Ok(neighbor_detail(&command, &raw, neighbor)?.map(|d| d.to_state()))
    }

    /// Prefixes advertised to each neighbor
    pub async fn advertised_routes(
        &self,
        neighbors: &[IpAddr],
    ) -> Result<BTreeMap<IpAddr, BTreeSet<String>>, ObserveError> {
        let mut out = BTreeMap::new();
        for neighbor in neighbors {
            let command = match Family::of(neighbor) {
                Family::Ipv4 => format!("show ip bgp neighbor {neighbor} advertised-routes json"),
                Family::Ipv6 => {
                    format!("show bgp ipv6 unicast neighbor {neighbor} advertised-routes json")
                }
            };
            let routes: AdvertisedRoutes = self.json(&command).await?;
            out.insert(*neighbor, routes.prefixes());
        }
        Ok(out)
    }

    /// Raw v4 and v6 BGP tables, concatenated. Callers match by substring.
    pub async fn received_routes(&self) -> Result<String, ObserveError> {
        let v4 = self.vtysh(&["show ip bgp json"]).await?;
        let v6 = self.vtysh(&["show bgp ipv6 json"]).await?;
        if v4.trim().is_empty() && v6.trim().is_empty() {
            return Err(ObserveError::EmptyOutput("show ip bgp json".to_string()));
        }
        Ok(format!("{v4}\n{v6}"))
    }

    /// BGP table of a family
    pub async fn rib(&self, family: Family) -> Result<BgpTable, ObserveError> {
        self.json(&format!("show bgp {family} unicast json")).await
    }

    /// Routes of a family carrying `community`
    pub async fn routes_with_community(
        &self,
        family: Family,
        community: &str,
    ) -> Result<BgpTable, ObserveError> {
        self.json(&format!("show bgp {family} unicast community {community} json"))
            .await
    }

    /// Attributes of the best path to `prefix`, `None` when the prefix is unknown
    pub async fn prefix_attributes(
        &self,
        family: Family,
        prefix: &str,
    ) -> Result<Option<PrefixAttributes>, ObserveError> {
        let detail: PrefixDetail = self
            .json(&format!("show bgp {family} unicast {prefix} json"))
            .await?;
        Ok(detail.best())
    }

    fn router_commands(asn: u32, command: &str) -> [String; 3] {
        [
            "configure terminal".to_string(),
            format!("router bgp {asn}"),
            command.to_string(),
        ]
    }

    async fn configure(&self, asn: u32, command: &str) -> Result<(), ObserveError> {
        let commands = Self::router_commands(asn, command);
        let refs: Vec<&str> = commands.iter().map(String::as_str).collect();
        debug!("{}: {}", self.pod, command);
        self.vtysh(&refs).await.map(|_| ())
    }

    /// Administratively shut the session with `neighbor` down
    pub async fn shutdown_neighbor(&self, asn: u32, neighbor: IpAddr) -> Result<(), ObserveError> {
        self.configure(asn, &format!("neighbor {neighbor} shutdown")).await
    }

    pub async fn no_shutdown_neighbor(&self, asn: u32, neighbor: IpAddr) -> Result<(), ObserveError> {
        self.configure(asn, &format!("no neighbor {neighbor} shutdown"))
            .await
    }

    /// Reset every session so that new parameters are negotiated
    pub async fn clear_sessions(&self) -> Result<(), ObserveError> {
        debug!("{}: clearing all bgp sessions", self.pod);
        self.vtysh(&["clear bgp *"]).await.map(|_| ())
    }

    /// Whether the daemons answer. Tells when an external FRR pod is up.
    pub async fn responds(&self) -> Result<bool, ObserveError> {
        let out = self.vtysh(&["show version"]).await?;
        Ok(out.contains("FRRouting"))
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeExec;
    use super::*;
    use pretty_assertions::assert_eq;

    fn pod() -> PodRef {
        PodRef::new("metallb-tests", "frr-master", Some("frr"))
    }

    #[tokio::test]
    async fn test_session_control_commands() {
        let exec = FakeExec::default();
        let frr = FrrPod::new(&exec, pod());
        let ip: IpAddr = "10.0.0.3".parse().unwrap();
        frr.shutdown_neighbor(64500, ip).await.unwrap();
        frr.no_shutdown_neighbor(64500, ip).await.unwrap();
        frr.clear_sessions().await.unwrap();
        let calls = exec.calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                "vtysh -c configure terminal -c router bgp 64500 -c neighbor 10.0.0.3 shutdown",
                "vtysh -c configure terminal -c router bgp 64500 -c no neighbor 10.0.0.3 shutdown",
                "vtysh -c clear bgp *",
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_output_is_transient() {
        let exec = FakeExec::default();
        let frr = FrrPod::new(&exec, pod());
        let err = frr.bgp_summary().await.unwrap_err();
        assert!(matches!(err, ObserveError::EmptyOutput(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_advertised_routes() {
        let exec = FakeExec::default();
        exec.ok(
            "neighbor 10.0.0.2 advertised-routes",
            r#"{"bgpTableVersion": 3, "advertisedRoutes": {"192.168.100.0/28": {"addrPrefix": "192.168.100.0"}}}"#,
        );
        exec.ok(
            "neighbor fd00::2 advertised-routes",
            r#"{"advertisedRoutes": {"fc00:f853:ccd:e799::/124": {}}}"#,
        );
        let frr = FrrPod::new(&exec, pod());
        let v4: IpAddr = "10.0.0.2".parse().unwrap();
        let v6: IpAddr = "fd00::2".parse().unwrap();
        let routes = frr.advertised_routes(&[v4, v6]).await.unwrap();
        assert!(routes[&v4].contains("192.168.100.0/28"));
        assert!(routes[&v6].contains("fc00:f853:ccd:e799::/124"));
    }

    #[tokio::test]
    async fn test_received_routes_concatenates_families() {
        let exec = FakeExec::default();
        exec.ok("show ip bgp json", r#"{"routes": {"192.168.100.0/24": []}}"#);
        exec.ok("show bgp ipv6 json", r#"{"routes": {"fc00::/64": []}}"#);
        let frr = FrrPod::new(&exec, pod());
        let out = frr.received_routes().await.unwrap();
        assert!(out.contains("192.168.100.0/24"));
        assert!(out.contains("fc00::/64"));
    }

    #[tokio::test]
    async fn test_unknown_neighbor() {
        let exec = FakeExec::default();
        exec.ok("show bgp neighbor", r#"{"bgpNoSuchNeighbor": true}"#);
        let frr = FrrPod::new(&exec, pod());
        let state = frr.neighbor_state("10.0.0.9".parse().unwrap()).await.unwrap();
        assert!(state.is_none());
    }
}
