// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! BGP finite state machine states as reported by FRR

use std::str::FromStr;

use strum_macros::{Display, EnumString};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum SessionState {
    Idle,
    Connect,
    Active,
    OpenSent,
    OpenConfirm,
    Established,
}

impl SessionState {
    /// Parse a state as printed by FRR. Qualifiers such as `Idle (Admin)` are ignored.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        SessionState::from_str(word).ok()
    }

    #[must_use]
    pub fn is_established(self) -> bool {
        self == SessionState::Established
    }
}
