// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Line oriented builder for FRR configuration text

use std::fmt::Display;
use std::ops::AddAssign;

/// Separator line between FRR configuration blocks
pub const MARKER: &str = "!";

/// Something that can be rendered as configuration text
pub trait Render {
    type Context;
    type Output;
    fn render(&self, ctx: &Self::Context) -> Self::Output;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigBuilder {
    lines: Vec<String>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Append a line unless it would repeat the marker
    fn push(&mut self, line: String) {
        if line == MARKER && self.lines.last().is_some_and(|l| l == MARKER) {
            return;
        }
        self.lines.push(line);
    }
}

impl AddAssign<&str> for ConfigBuilder {
    fn add_assign(&mut self, line: &str) {
        self.push(line.to_owned());
    }
}

impl AddAssign<String> for ConfigBuilder {
    fn add_assign(&mut self, line: String) {
        self.push(line);
    }
}

impl AddAssign<ConfigBuilder> for ConfigBuilder {
    fn add_assign(&mut self, other: ConfigBuilder) {
        for line in other.lines {
            self.push(line);
        }
    }
}

impl Display for ConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_are_not_repeated() {
        let mut cfg = ConfigBuilder::new();
        cfg += MARKER;
        cfg += "router bgp 64500";
        cfg += MARKER;
        let mut inner = ConfigBuilder::new();
        inner += MARKER;
        inner += "exit";
        cfg += inner;
        assert_eq!(cfg.to_string(), "!\nrouter bgp 64500\n!\nexit\n");
    }
}
