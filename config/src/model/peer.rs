// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! BGP peers of the MetalLB speakers

use std::net::IpAddr;
use std::time::Duration;

use crate::{ConfigError, ConfigResult};

pub const BGP_PORT: u16 = 179;

/// FRR defaults, reported by the external router when the peer sets no timers
pub const DEFAULT_HOLD_TIME: Duration = Duration::from_secs(180);
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peer {
    pub name: String,
    pub peer_ip: IpAddr,
    pub remote_asn: u32,
    pub local_asn: u32,
    pub ebgp_multihop: bool,
    pub password: Option<String>,
    pub port: u16,
    pub hold_time: Option<Duration>,
    pub keepalive: Option<Duration>,
    pub bfd_profile: Option<String>,
    pub source_address: Option<IpAddr>,
    /// Not referenced by any advertisement on purpose (negative tests)
    pub unused: bool,
}

impl Peer {
    #[must_use]
    pub fn new(name: &str, peer_ip: IpAddr, local_asn: u32, remote_asn: u32) -> Self {
        Self {
            name: name.to_owned(),
            peer_ip,
            remote_asn,
            local_asn,
            ebgp_multihop: false,
            password: None,
            port: BGP_PORT,
            hold_time: None,
            keepalive: None,
            bfd_profile: None,
            source_address: None,
            unused: false,
        }
    }

    #[must_use]
    pub fn set_ebgp_multihop(mut self, value: bool) -> Self {
        self.ebgp_multihop = value;
        self
    }

    #[must_use]
    pub fn set_password(mut self, password: Option<&str>) -> Self {
        self.password = password.map(ToOwned::to_owned);
        self
    }

    #[must_use]
    pub fn set_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn set_timers(mut self, hold_time: Option<Duration>, keepalive: Option<Duration>) -> Self {
        self.hold_time = hold_time;
        self.keepalive = keepalive;
        self
    }

    #[must_use]
    pub fn set_bfd_profile(mut self, profile: Option<&str>) -> Self {
        self.bfd_profile = profile.map(ToOwned::to_owned);
        self
    }

    #[must_use]
    pub fn set_source_address(mut self, source: Option<IpAddr>) -> Self {
        self.source_address = source;
        self
    }

    #[must_use]
    pub fn mark_unused(mut self) -> Self {
        self.unused = true;
        self
    }

    #[must_use]
    pub fn is_ibgp(&self) -> bool {
        self.local_asn == self.remote_asn
    }

    /// Hold time and keepalive the remote end should report once the session is up
    #[must_use]
    pub fn effective_timers(&self) -> (Duration, Duration) {
        (
            self.hold_time.unwrap_or(DEFAULT_HOLD_TIME),
            self.keepalive.unwrap_or(DEFAULT_KEEPALIVE),
        )
    }

    pub fn validate(&self) -> ConfigResult {
        if self.name.is_empty() {
            return Err(ConfigError::MissingParameter("peer name"));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("peer port", "0".to_string()));
        }
        if let Some(hold) = self.hold_time {
            if !hold.is_zero() && hold < Duration::from_secs(3) {
                return Err(ConfigError::InvalidTimers(
                    self.name.clone(),
                    format!("hold time {}s must be 0 or at least 3s", hold.as_secs()),
                ));
            }
        }
        if let (Some(hold), Some(keepalive)) = (self.hold_time, self.keepalive) {
            if keepalive > hold {
                return Err(ConfigError::InvalidTimers(
                    self.name.clone(),
                    format!(
                        "keepalive {}s exceeds hold time {}s",
                        keepalive.as_secs(),
                        hold.as_secs()
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Render a duration the way kubernetes `metav1.Duration` fields expect it
#[must_use]
pub fn k8s_duration(d: Duration) -> String {
    format!("{}s", d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> Peer {
        Peer::new("peer-one", "10.0.0.1".parse().unwrap(), 64501, 64500)
    }

    #[test]
    fn test_defaults() {
        let p = peer();
        assert_eq!(p.port, 179);
        assert!(!p.is_ibgp());
        assert_eq!(
            p.effective_timers(),
            (Duration::from_secs(180), Duration::from_secs(60))
        );
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_timers() {
        let p = peer().set_timers(Some(Duration::from_secs(30)), Some(Duration::from_secs(10)));
        assert!(p.validate().is_ok());
        assert_eq!(
            p.effective_timers(),
            (Duration::from_secs(30), Duration::from_secs(10))
        );

        let p = peer().set_timers(Some(Duration::from_secs(10)), Some(Duration::from_secs(30)));
        assert!(matches!(p.validate(), Err(ConfigError::InvalidTimers(..))));

        let p = peer().set_timers(Some(Duration::from_secs(2)), None);
        assert!(matches!(p.validate(), Err(ConfigError::InvalidTimers(..))));
    }

    #[test]
    fn test_k8s_duration() {
        assert_eq!(k8s_duration(Duration::from_secs(30)), "30s");
    }
}
