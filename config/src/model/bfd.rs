// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! BFD profiles

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BfdProfile {
    pub name: String,
    pub receive_interval_ms: Option<u32>,
    pub transmit_interval_ms: Option<u32>,
    pub detect_multiplier: Option<u32>,
    pub echo_mode: bool,
    pub passive_mode: bool,
    pub minimum_ttl: Option<u32>,
}

impl BfdProfile {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            receive_interval_ms: None,
            transmit_interval_ms: None,
            detect_multiplier: None,
            echo_mode: false,
            passive_mode: false,
            minimum_ttl: None,
        }
    }

    #[must_use]
    pub fn set_intervals(mut self, receive_ms: u32, transmit_ms: u32, multiplier: u32) -> Self {
        self.receive_interval_ms = Some(receive_ms);
        self.transmit_interval_ms = Some(transmit_ms);
        self.detect_multiplier = Some(multiplier);
        self
    }

    #[must_use]
    pub fn set_echo_mode(mut self, value: bool) -> Self {
        self.echo_mode = value;
        self
    }

    #[must_use]
    pub fn set_passive_mode(mut self, value: bool) -> Self {
        self.passive_mode = value;
        self
    }

    #[must_use]
    pub fn set_minimum_ttl(mut self, ttl: Option<u32>) -> Self {
        self.minimum_ttl = ttl;
        self
    }
}
