// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Expectations on the BGP state of an FRR instance.
//!
//! Each expectation is checked in two halves: an async observation through `vtysh` and a
//! pure predicate over what was observed. The predicate returns an [`Evaluation`]
//! carrying the observed state in printable form, so a timed out wait can report it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use config::model::Family;
use ipnet::IpNet;

use crate::error::ObserveError;
use crate::frr::{BgpTable, NeighborState, PrefixAttributes};
use crate::state::SessionState;
use crate::vtysh::FrrPod;

/// Outcome of checking a condition once
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
    pub done: bool,
    pub observed: String,
}

impl Evaluation {
    #[must_use]
    pub fn new(done: bool, observed: impl Into<String>) -> Self {
        Self {
            done,
            observed: observed.into(),
        }
    }
}

/// Something that can be checked repeatedly until it holds
#[async_trait]
pub trait Condition: Send + Sync {
    fn describe(&self) -> String;
    async fn evaluate(&self) -> Result<Evaluation, ObserveError>;
}

/// Best path attributes a prefix is expected to carry. Unset fields are not checked.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpectedAttributes {
    pub local_pref: Option<u32>,
    pub communities: BTreeSet<String>,
    pub nexthop: Option<IpAddr>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expectation {
    /// every neighbor is established
    SessionsUp(Vec<IpAddr>),
    /// no neighbor is established
    SessionsDown(Vec<IpAddr>),
    NeighborInState(IpAddr, SessionState),
    NeighborTimers {
        neighbor: IpAddr,
        hold_time: Duration,
        keepalive: Duration,
    },
    PrefixLearned(IpNet),
    HasCommunity {
        family: Family,
        community: String,
    },
    HasLocalPref {
        family: Family,
        local_pref: u32,
    },
    ReceivedRoutesContain(Vec<String>),
    AdvertisedContain {
        neighbor: IpAddr,
        prefixes: Vec<IpNet>,
    },
    PrefixAttributes {
        prefix: IpNet,
        expected: ExpectedAttributes,
    },
}

fn join<T: Display>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Display for Expectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expectation::SessionsUp(n) => write!(f, "sessions up with [{}]", join(n)),
            Expectation::SessionsDown(n) => write!(f, "sessions down with [{}]", join(n)),
            Expectation::NeighborInState(n, s) => write!(f, "neighbor {n} in state {s}"),
            Expectation::NeighborTimers {
                neighbor,
                hold_time,
                keepalive,
            } => write!(
                f,
                "neighbor {neighbor} with hold {}ms keepalive {}ms",
                hold_time.as_millis(),
                keepalive.as_millis()
            ),
            Expectation::PrefixLearned(p) => write!(f, "prefix {p} learned"),
            Expectation::HasCommunity { family, community } => {
                write!(f, "{family} routes with community {community}")
            }
            Expectation::HasLocalPref { family, local_pref } => {
                write!(f, "{family} routes with local preference {local_pref}")
            }
            Expectation::ReceivedRoutesContain(s) => {
                write!(f, "received routes containing [{}]", join(s))
            }
            Expectation::AdvertisedContain { neighbor, prefixes } => {
                write!(f, "[{}] advertised to {neighbor}", join(prefixes))
            }
            Expectation::PrefixAttributes { prefix, expected } => {
                write!(f, "prefix {prefix} with {expected:?}")
            }
        }
    }
}

fn states_to_string(states: &BTreeMap<IpAddr, SessionState>) -> String {
    if states.is_empty() {
        return "no neighbors".to_string();
    }
    join(states.iter().map(|(ip, s)| format!("{ip}={s}")))
}

/// Sessions with `neighbors` are all established (`up`) or none is
#[must_use]
pub fn sessions_evaluation(
    states: &BTreeMap<IpAddr, SessionState>,
    neighbors: &[IpAddr],
    up: bool,
) -> Evaluation {
    let done = neighbors.iter().all(|n| {
        let established = states.get(n).is_some_and(|s| s.is_established());
        established == up
    });
    Evaluation::new(done, states_to_string(states))
}

#[must_use]
pub fn neighbor_state_evaluation(observed: Option<&NeighborState>, wanted: SessionState) -> Evaluation {
    match observed {
        None => Evaluation::new(false, "unknown neighbor"),
        Some(n) => {
            let text = n.state.map_or_else(|| "unparsable state".to_string(), |s| s.to_string());
            Evaluation::new(n.state == Some(wanted), text)
        }
    }
}

#[must_use]
pub fn timers_evaluation(
    observed: Option<&NeighborState>,
    hold_time: Duration,
    keepalive: Duration,
) -> Evaluation {
    let Some(n) = observed else {
        return Evaluation::new(false, "unknown neighbor");
    };
    let ms = |d: Option<Duration>| d.map_or_else(|| "-".to_string(), |d| d.as_millis().to_string());
    Evaluation::new(
        n.hold_time == Some(hold_time) && n.keepalive == Some(keepalive),
        format!("hold={}ms keepalive={}ms", ms(n.hold_time), ms(n.keepalive)),
    )
}

fn table_summary(table: &BgpTable) -> String {
    if table.routes.is_empty() {
        return "no routes".to_string();
    }
    join(table.prefixes())
}

/// A valid path to `prefix` is in the table
#[must_use]
pub fn prefix_learned_evaluation(table: &BgpTable, prefix: &IpNet) -> Evaluation {
    let key = prefix.to_string();
    let done = table
        .routes
        .get(&key)
        .is_some_and(|paths| paths.iter().any(|p| p.valid));
    Evaluation::new(done, table_summary(table))
}

/// The table, already filtered by community, is not empty
#[must_use]
pub fn community_evaluation(filtered: &BgpTable) -> Evaluation {
    Evaluation::new(!filtered.routes.is_empty(), table_summary(filtered))
}

#[must_use]
pub fn local_pref_evaluation(table: &BgpTable, local_pref: u32) -> Evaluation {
    let done = table.paths().any(|(_, p)| p.loc_prf == Some(local_pref));
    let seen: BTreeSet<String> = table
        .paths()
        .map(|(prefix, p)| {
            format!(
                "{prefix} locPrf={}",
                p.loc_prf.map_or_else(|| "-".to_string(), |l| l.to_string())
            )
        })
        .collect();
    Evaluation::new(done, if seen.is_empty() { "no routes".to_string() } else { join(seen) })
}

#[must_use]
pub fn contains_all_evaluation(raw: &str, needles: &[String]) -> Evaluation {
    let missing: Vec<&String> = needles.iter().filter(|n| !raw.contains(n.as_str())).collect();
    if missing.is_empty() {
        Evaluation::new(true, "all found")
    } else {
        Evaluation::new(false, format!("missing [{}]", join(missing)))
    }
}

#[must_use]
pub fn advertised_evaluation(advertised: Option<&BTreeSet<String>>, prefixes: &[IpNet]) -> Evaluation {
    let Some(advertised) = advertised else {
        return Evaluation::new(false, "nothing advertised");
    };
    let done = prefixes.iter().all(|p| advertised.contains(&p.to_string()));
    Evaluation::new(done, join(advertised))
}

#[must_use]
pub fn attributes_evaluation(
    observed: Option<&PrefixAttributes>,
    expected: &ExpectedAttributes,
) -> Evaluation {
    let Some(attrs) = observed else {
        return Evaluation::new(false, "prefix not found");
    };
    let local_pref_ok = expected.local_pref.is_none() || expected.local_pref == attrs.local_pref;
    let communities_ok = expected.communities.is_subset(&attrs.communities);
    let nexthop_ok = expected
        .nexthop
        .is_none_or(|nh| attrs.nexthops.iter().any(|n| n == &nh.to_string()));
    Evaluation::new(
        local_pref_ok && communities_ok && nexthop_ok,
        format!(
            "nexthops=[{}] locPrf={} communities=[{}] aspath='{}'",
            join(&attrs.nexthops),
            attrs
                .local_pref
                .map_or_else(|| "-".to_string(), |l| l.to_string()),
            join(&attrs.communities),
            attrs.as_path
        ),
    )
}

/// An expectation checked against an FRR instance
pub struct Expect<'a> {
    frr: &'a FrrPod<'a>,
    expectation: Expectation,
}

impl<'a> Expect<'a> {
    #[must_use]
    pub fn new(frr: &'a FrrPod<'a>, expectation: Expectation) -> Self {
        Self { frr, expectation }
    }
}

fn family_of(prefix: &IpNet) -> Family {
    Family::of(&prefix.addr())
}

#[async_trait]
impl Condition for Expect<'_> {
    fn describe(&self) -> String {
        format!("{} on {}", self.expectation, self.frr.pod())
    }

    async fn evaluate(&self) -> Result<Evaluation, ObserveError> {
        let frr = self.frr;
        let evaluation = match &self.expectation {
            Expectation::SessionsUp(neighbors) => {
                sessions_evaluation(&frr.bgp_summary().await?.peer_states(), neighbors, true)
            }
            Expectation::SessionsDown(neighbors) => {
                sessions_evaluation(&frr.bgp_summary().await?.peer_states(), neighbors, false)
            }
            Expectation::NeighborInState(neighbor, state) => {
                neighbor_state_evaluation(frr.neighbor_state(*neighbor).await?.as_ref(), *state)
            }
            Expectation::NeighborTimers {
                neighbor,
                hold_time,
                keepalive,
            } => timers_evaluation(
                frr.neighbor_state(*neighbor).await?.as_ref(),
                *hold_time,
                *keepalive,
            ),
            Expectation::PrefixLearned(prefix) => {
                prefix_learned_evaluation(&frr.rib(family_of(prefix)).await?, prefix)
            }
            Expectation::HasCommunity { family, community } => {
                community_evaluation(&frr.routes_with_community(*family, community).await?)
            }
            Expectation::HasLocalPref { family, local_pref } => {
                local_pref_evaluation(&frr.rib(*family).await?, *local_pref)
            }
            Expectation::ReceivedRoutesContain(needles) => {
                contains_all_evaluation(&frr.received_routes().await?, needles)
            }
            Expectation::AdvertisedContain { neighbor, prefixes } => {
                let advertised = frr.advertised_routes(&[*neighbor]).await?;
                advertised_evaluation(advertised.get(neighbor), prefixes)
            }
            Expectation::PrefixAttributes { prefix, expected } => {
                let attrs = frr
                    .prefix_attributes(family_of(prefix), &prefix.to_string())
                    .await?;
                attributes_evaluation(attrs.as_ref(), expected)
            }
        };
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frr::parse_json;
    use crate::vtysh::fake::FakeExec;
    use k8s_intf::PodRef;
    use pretty_assertions::assert_eq;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_sessions_evaluation() {
        let states = BTreeMap::from([
            (ip("10.0.0.2"), SessionState::Established),
            (ip("10.0.0.3"), SessionState::Active),
        ]);
        assert!(sessions_evaluation(&states, &[ip("10.0.0.2")], true).done);
        assert!(!sessions_evaluation(&states, &[ip("10.0.0.2"), ip("10.0.0.3")], true).done);
        assert!(sessions_evaluation(&states, &[ip("10.0.0.3")], false).done);
        // unknown neighbors are down
        assert!(sessions_evaluation(&states, &[ip("10.0.0.4")], false).done);
        assert_eq!(
            sessions_evaluation(&states, &[], true).observed,
            "10.0.0.2=Established, 10.0.0.3=Active"
        );
    }

    #[test]
    fn test_timers_evaluation() {
        let n = NeighborState {
            state: Some(SessionState::Established),
            hold_time: Some(Duration::from_secs(30)),
            keepalive: Some(Duration::from_secs(10)),
        };
        let e = timers_evaluation(Some(&n), Duration::from_secs(30), Duration::from_secs(10));
        assert!(e.done);
        let e = timers_evaluation(Some(&n), Duration::from_secs(180), Duration::from_secs(60));
        assert!(!e.done);
        assert_eq!(e.observed, "hold=30000ms keepalive=10000ms");
        assert!(!timers_evaluation(None, Duration::ZERO, Duration::ZERO).done);
    }

    #[test]
    fn test_table_evaluations() {
        let raw = r#"{"routes": {
            "192.168.100.0/28": [{"valid": true, "bestpath": true, "locPrf": 200, "path": "64501"}],
            "192.168.10.0/24": [{"valid": false, "path": "64501"}]}}"#;
        let table: BgpTable = parse_json("cmd", raw).unwrap().unwrap();
        assert!(prefix_learned_evaluation(&table, &"192.168.100.0/28".parse().unwrap()).done);
        assert!(!prefix_learned_evaluation(&table, &"192.168.10.0/24".parse().unwrap()).done);
        assert!(local_pref_evaluation(&table, 200).done);
        assert!(!local_pref_evaluation(&table, 100).done);
        assert!(community_evaluation(&table).done);
        assert!(!community_evaluation(&BgpTable::default()).done);
    }

    #[test]
    fn test_attributes_evaluation() {
        let attrs = PrefixAttributes {
            nexthops: vec!["10.0.0.2".to_string()],
            local_pref: Some(100),
            communities: BTreeSet::from(["no-advertise".to_string()]),
            as_path: "64501".to_string(),
        };
        let mut expected = ExpectedAttributes {
            local_pref: Some(100),
            communities: BTreeSet::from(["no-advertise".to_string()]),
            nexthop: Some(ip("10.0.0.2")),
        };
        assert!(attributes_evaluation(Some(&attrs), &expected).done);
        expected.local_pref = Some(200);
        let e = attributes_evaluation(Some(&attrs), &expected);
        assert!(!e.done);
        assert_eq!(
            e.observed,
            "nexthops=[10.0.0.2] locPrf=100 communities=[no-advertise] aspath='64501'"
        );
        assert!(!attributes_evaluation(None, &ExpectedAttributes::default()).done);
    }

    #[test]
    fn test_contains_all() {
        let needles = vec!["192.168.100.0/24".to_string(), "192.168.200.0/24".to_string()];
        let e = contains_all_evaluation(r#"{"192.168.100.0/24": []}"#, &needles);
        assert_eq!(e, Evaluation::new(false, "missing [192.168.200.0/24]"));
    }

    #[tokio::test]
    async fn test_expect_sessions_up() {
        let exec = FakeExec::default();
        exec.ok(
            "show bgp summary json",
            r#"{"ipv4Unicast": {"peers": {"10.0.0.2": {"state": "Established"}}}}"#,
        );
        let frr = FrrPod::new(&exec, PodRef::new("ns", "frr", None));
        let expect = Expect::new(&frr, Expectation::SessionsUp(vec![ip("10.0.0.2")]));
        assert_eq!(expect.describe(), "sessions up with [10.0.0.2] on ns/frr");
        assert!(expect.evaluate().await.unwrap().done);
    }
}
