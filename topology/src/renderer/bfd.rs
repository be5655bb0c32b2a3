// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Config renderer: BFD

use std::net::IpAddr;

use crate::renderer::builder::{ConfigBuilder, MARKER, Render};

pub const BFD_DETECT_MULTIPLIER: u8 = 3;
pub const BFD_TRANSMIT_INTERVAL_MS: u16 = 300;
pub const BFD_RECEIVE_INTERVAL_MS: u16 = 300;

/// A BFD peer of the external router, one per BGP neighbor with BFD enabled
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BfdPeer {
    pub address: IpAddr,
    pub multihop: bool,
    pub source: Option<IpAddr>,
}

impl Render for BfdPeer {
    type Context = ();
    type Output = ConfigBuilder;

    fn render(&self, (): &Self::Context) -> Self::Output {
        let mut cfg = ConfigBuilder::new();

        let mut peer = format!(" peer {}", self.address);
        if self.multihop {
            peer += " multihop";
            /* frr requires a local address for multihop peers */
            if let Some(src) = self.source.as_ref() {
                peer += &format!(" local-address {src}");
            }
        }
        cfg += peer;
        cfg += "  no shutdown";
        cfg += format!("  detect-multiplier {BFD_DETECT_MULTIPLIER}");
        cfg += format!("  transmit-interval {BFD_TRANSMIT_INTERVAL_MS}");
        cfg += format!("  receive-interval {BFD_RECEIVE_INTERVAL_MS}");
        cfg += " exit";
        cfg
    }
}

impl Render for Vec<BfdPeer> {
    type Context = ();
    type Output = ConfigBuilder;

    fn render(&self, (): &Self::Context) -> Self::Output {
        let mut cfg = ConfigBuilder::new();
        if self.is_empty() {
            return cfg;
        }
        cfg += MARKER;
        cfg += "bfd";
        for p in self {
            cfg += p.render(&());
        }
        cfg += "exit";
        cfg += MARKER;
        cfg
    }
}
