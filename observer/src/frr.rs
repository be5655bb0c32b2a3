// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `vtysh` JSON outputs. Every field is optional: FRR omits what does not apply and
//! prints `{}` when there is nothing to show.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::ObserveError;
use crate::state::SessionState;

/// Parse a JSON output. Empty output is `Ok(None)` so callers can retry.
pub fn parse_json<T: DeserializeOwned>(command: &str, raw: &str) -> Result<Option<T>, ObserveError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| ObserveError::Parse {
            command: command.to_string(),
            reason: e.to_string(),
            raw: raw.to_string(),
        })
}

/// `show bgp summary json`
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BgpSummary {
    #[serde(default)]
    pub ipv4_unicast: Option<AfSummary>,
    #[serde(default)]
    pub ipv6_unicast: Option<AfSummary>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AfSummary {
    #[serde(default)]
    pub router_id: Option<String>,
    #[serde(default, rename = "as")]
    pub local_as: Option<u32>,
    #[serde(default)]
    pub peers: BTreeMap<String, PeerSummary>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSummary {
    #[serde(default)]
    pub remote_as: Option<u32>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub pfx_rcd: Option<u64>,
    #[serde(default)]
    pub pfx_snt: Option<u64>,
}

impl BgpSummary {
    /// State of every neighbor addressed by IP, across address families
    #[must_use]
    pub fn peer_states(&self) -> BTreeMap<IpAddr, SessionState> {
        let mut out = BTreeMap::new();
        for af in [&self.ipv4_unicast, &self.ipv6_unicast].into_iter().flatten() {
            for (peer, summary) in &af.peers {
                let (Ok(ip), Some(state)) = (peer.parse::<IpAddr>(), SessionState::parse(&summary.state))
                else {
                    continue;
                };
                out.entry(ip).or_insert(state);
            }
        }
        out
    }
}

/// One neighbor of `show bgp neighbor <ip> json`
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborDetail {
    #[serde(default)]
    pub remote_as: Option<u32>,
    #[serde(default)]
    pub bgp_state: String,
    #[serde(default)]
    pub bgp_timer_hold_time_msecs: Option<u64>,
    #[serde(default)]
    pub bgp_timer_keep_alive_interval_msecs: Option<u64>,
}

/// Observed state and negotiated timers of a neighbor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NeighborState {
    pub state: Option<SessionState>,
    pub hold_time: Option<Duration>,
    pub keepalive: Option<Duration>,
}

impl NeighborDetail {
    #[must_use]
    pub fn to_state(&self) -> NeighborState {
        NeighborState {
            state: SessionState::parse(&self.bgp_state),
            hold_time: self.bgp_timer_hold_time_msecs.map(Duration::from_millis),
            keepalive: self
                .bgp_timer_keep_alive_interval_msecs
                .map(Duration::from_millis),
        }
    }
}

/// Extract `neighbor` from a `show bgp neighbor` output. FRR keys the object by address and
/// reports unknown neighbors with a `bgpNoSuchNeighbor` flag instead.
pub fn neighbor_detail(
    command: &str,
    raw: &str,
    neighbor: IpAddr,
) -> Result<Option<NeighborDetail>, ObserveError> {
    let Some(mut all) = parse_json::<BTreeMap<String, serde_json::Value>>(command, raw)? else {
        return Ok(None);
    };
    let Some(value) = all.remove(&neighbor.to_string()) else {
        return Ok(None);
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| ObserveError::Parse {
            command: command.to_string(),
            reason: e.to_string(),
            raw: raw.to_string(),
        })
}

/// `show ip bgp neighbor <n> advertised-routes json`
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisedRoutes {
    #[serde(default)]
    pub advertised_routes: BTreeMap<String, serde_json::Value>,
}

impl AdvertisedRoutes {
    #[must_use]
    pub fn prefixes(&self) -> BTreeSet<String> {
        self.advertised_routes.keys().cloned().collect()
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct Nexthop {
    #[serde(default)]
    pub ip: Option<String>,
}

/// `show bgp <afi> unicast json`, also used for community filtered tables
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BgpTable {
    #[serde(default)]
    pub routes: BTreeMap<String, Vec<TablePath>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePath {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub bestpath: bool,
    #[serde(default)]
    pub loc_prf: Option<u32>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub nexthops: Vec<Nexthop>,
}

impl BgpTable {
    #[must_use]
    pub fn prefixes(&self) -> BTreeSet<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    pub fn paths(&self) -> impl Iterator<Item = (&str, &TablePath)> {
        self.routes
            .iter()
            .flat_map(|(prefix, paths)| paths.iter().map(move |p| (prefix.as_str(), p)))
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct StringAttr {
    #[serde(default)]
    pub string: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct BestPath {
    #[serde(default)]
    pub overall: bool,
}

/// `show bgp <afi> unicast <prefix> json`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PrefixDetail {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub paths: Vec<DetailPath>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailPath {
    #[serde(default)]
    pub aspath: Option<StringAttr>,
    #[serde(default)]
    pub community: Option<StringAttr>,
    #[serde(default)]
    pub loc_prf: Option<u32>,
    #[serde(default)]
    pub nexthops: Vec<Nexthop>,
    #[serde(default)]
    pub bestpath: Option<BestPath>,
}

/// Attributes of the best path towards a prefix
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrefixAttributes {
    pub nexthops: Vec<String>,
    pub local_pref: Option<u32>,
    pub communities: BTreeSet<String>,
    pub as_path: String,
}

impl PrefixDetail {
    /// Attributes of the best path, or of the first path when none is marked best
    #[must_use]
    pub fn best(&self) -> Option<PrefixAttributes> {
        let path = self
            .paths
            .iter()
            .find(|p| p.bestpath.as_ref().is_some_and(|b| b.overall))
            .or_else(|| self.paths.first())?;
        Some(PrefixAttributes {
            nexthops: path.nexthops.iter().filter_map(|n| n.ip.clone()).collect(),
            local_pref: path.loc_prf,
            communities: path
                .community
                .as_ref()
                .map(|c| c.string.split_whitespace().map(normalize_community).collect())
                .unwrap_or_default(),
            as_path: path.aspath.as_ref().map(|a| a.string.clone()).unwrap_or_default(),
        })
    }
}

/// FRR prints well known communities by name
const WELL_KNOWN: [(&str, &str); 4] = [
    ("65535:65281", "no-export"),
    ("65535:65282", "no-advertise"),
    ("65535:65283", "local-AS"),
    ("65535:0", "graceful-shutdown"),
];

/// Name FRR uses for a community, e.g. `no-advertise` for `65535:65282`
#[must_use]
pub fn normalize_community(community: &str) -> String {
    WELL_KNOWN
        .iter()
        .find(|(value, _)| *value == community)
        .map_or_else(|| community.to_string(), |(_, name)| (*name).to_string())
}
