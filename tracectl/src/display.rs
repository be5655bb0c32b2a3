// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Display of tracing control state

use std::fmt::Display;

use crate::control::TargetState;

macro_rules! TARGET_FMT {
    ($name:expr, $level:expr, $module:expr, $tags:expr) => {
        format_args!(" {:<24} {:<6} {:<48} {}", $name, $level, $module, $tags)
    };
}

pub(crate) struct TargetTable<'a>(pub(crate) &'a [TargetState]);

impl Display for TargetTable<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, " ━━━━━━━━━━━━━━━━━━━━━━━ Trace targets ━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(f, "{}", TARGET_FMT!("name", "level", "module", "tags"))?;
        for target in self.0 {
            writeln!(
                f,
                "{}",
                TARGET_FMT!(
                    target.name,
                    target.level.to_string(),
                    target.module,
                    target.tags.join(",")
                )
            )?;
        }
        Ok(())
    }
}
