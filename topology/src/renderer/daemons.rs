// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Config renderer: the FRR `daemons` file and `vtysh.conf`

use crate::pod::Role;
use crate::renderer::builder::{ConfigBuilder, Render};

/// Daemons that are never started in the external routers
const DISABLED: &[&str] = &[
    "ospfd", "ospf6d", "ripd", "ripngd", "isisd", "pimd", "pim6d", "ldpd", "nhrpd", "eigrpd",
    "babeld", "sharpd", "pbrd", "fabricd", "vrrpd", "pathd",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Daemons {
    pub role: Role,
    pub bfd: bool,
}

impl Daemons {
    #[must_use]
    pub fn new(role: Role, bfd: bool) -> Self {
        Self { role, bfd }
    }
}

impl Render for Daemons {
    type Context = ();
    type Output = ConfigBuilder;

    fn render(&self, (): &Self::Context) -> Self::Output {
        let mut cfg = ConfigBuilder::new();
        cfg += format!("# {} router", self.role);
        cfg += "bgpd=yes";
        cfg += format!("bfdd={}", if self.bfd { "yes" } else { "no" });
        for daemon in DISABLED {
            cfg += format!("{daemon}=no");
        }
        cfg += "";
        cfg += "vtysh_enable=yes";
        cfg += "zebra_options=\"  -A 127.0.0.1 -s 90000000\"";
        cfg += "bgpd_options=\"   -A 127.0.0.1\"";
        if self.bfd {
            cfg += "bfdd_options=\"   -A 127.0.0.1\"";
        }
        cfg
    }
}

/// `vtysh.conf`: a single integrated `frr.conf`
pub struct VtyshConf;

impl Render for VtyshConf {
    type Context = ();
    type Output = ConfigBuilder;

    fn render(&self, (): &Self::Context) -> Self::Output {
        let mut cfg = ConfigBuilder::new();
        cfg += "service integrated-vtysh-config";
        cfg
    }
}
