// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Static routes between the speakers and the master router

use std::fmt::Display;
use std::net::IpAddr;

use ipnet::IpNet;

use crate::renderer::builder::{ConfigBuilder, Render};

/// Output of `ip route add` when the route is already there
pub const ROUTE_EXISTS: &str = "File exists";
/// Output of `ip route del` when the route is already gone
pub const ROUTE_MISSING: &str = "No such process";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StaticRoute {
    pub destination: IpNet,
    pub via: IpAddr,
}

impl StaticRoute {
    #[must_use]
    pub fn new(destination: IpNet, via: IpAddr) -> Self {
        Self { destination, via }
    }

    fn ip_route(&self, verb: &str) -> Vec<String> {
        let mut cmd = vec!["ip".to_string()];
        if let IpNet::V6(_) = self.destination {
            cmd.push("-6".to_string());
        }
        cmd.extend(["route", verb, &self.destination.to_string()].map(ToOwned::to_owned));
        cmd
    }

    fn command(&self, verb: &str) -> Vec<String> {
        let mut cmd = self.ip_route(verb);
        cmd.extend(["via".to_string(), self.via.to_string()]);
        cmd
    }

    /// Command line installing the route
    #[must_use]
    pub fn add_command(&self) -> Vec<String> {
        self.command("add")
    }

    /// Command line removing the route
    #[must_use]
    pub fn del_command(&self) -> Vec<String> {
        self.command("del")
    }

    /// Command line listing the routes to the destination
    #[must_use]
    pub fn show_command(&self) -> Vec<String> {
        self.ip_route("show")
    }

    /// Tell if the output of [`StaticRoute::show_command`] lists this route
    #[must_use]
    pub fn is_listed_in(&self, output: &str) -> bool {
        let via = format!("via {} ", self.via);
        output.lines().any(|line| format!("{line} ").contains(&via))
    }

    /// Tell if a failed `ip route` call left the route in the wanted state
    #[must_use]
    pub fn is_idempotent_failure(output: &str) -> bool {
        output.contains(ROUTE_EXISTS) || output.contains(ROUTE_MISSING)
    }
}

impl Display for StaticRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} via {}", self.destination, self.via)
    }
}

/// Shell script adding the routes, run by the pods at start up
impl Render for Vec<StaticRoute> {
    type Context = ();
    type Output = ConfigBuilder;

    fn render(&self, (): &Self::Context) -> Self::Output {
        let mut cfg = ConfigBuilder::new();
        if self.is_empty() {
            return cfg;
        }
        cfg += "#!/bin/sh";
        for route in self {
            cfg += format!("{} || true", route.add_command().join(" "));
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_commands() {
        let route = StaticRoute::new(
            "192.168.10.0/24".parse().unwrap(),
            "10.0.0.1".parse().unwrap(),
        );
        assert_eq!(
            route.add_command(),
            vec!["ip", "route", "add", "192.168.10.0/24", "via", "10.0.0.1"]
        );
        let route6 = StaticRoute::new(
            "2001:db8::/64".parse().unwrap(),
            "fd00::1".parse().unwrap(),
        );
        assert_eq!(
            route6.del_command(),
            vec!["ip", "-6", "route", "del", "2001:db8::/64", "via", "fd00::1"]
        );
        assert_eq!(route6.to_string(), "2001:db8::/64 via fd00::1");
        assert_eq!(route6.show_command(), vec!["ip", "-6", "route", "show", "2001:db8::/64"]);
    }

    #[test]
    fn test_is_listed_in() {
        let route = StaticRoute::new("10.46.82.0/24".parse().unwrap(), "10.46.81.1".parse().unwrap());
        assert!(route.is_listed_in("10.46.82.0/24 via 10.46.81.1 dev net1\n"));
        assert!(route.is_listed_in("10.46.82.0/24 via 10.46.81.1"));
        assert!(!route.is_listed_in("10.46.82.0/24 via 10.46.81.10 dev net1\n"));
        assert!(!route.is_listed_in(""));
    }

    #[test]
    fn test_script() {
        let routes = vec![StaticRoute::new(
            "10.0.2.0/24".parse().unwrap(),
            "10.0.1.1".parse().unwrap(),
        )];
        assert_eq!(
            routes.render(&()).to_string(),
            "#!/bin/sh\nip route add 10.0.2.0/24 via 10.0.1.1 || true\n"
        );
    }

    #[test]
    fn test_idempotent_failures() {
        assert!(StaticRoute::is_idempotent_failure(
            "RTNETLINK answers: File exists"
        ));
        assert!(StaticRoute::is_idempotent_failure(
            "RTNETLINK answers: No such process"
        ));
        assert!(!StaticRoute::is_idempotent_failure(
            "RTNETLINK answers: Network is unreachable"
        ));
    }
}
