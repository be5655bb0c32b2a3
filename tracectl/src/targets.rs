// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Registry of trace targets, collected at link time.

use linkme::distributed_slice;
use tracing_subscriber::filter::LevelFilter;

/// A named logging target. The `module` is the tracing target (module path) whose
/// verbosity the entry controls; `name` and `tags` are the handles users refer to.
#[derive(Debug)]
pub struct TraceTarget {
    pub name: &'static str,
    pub module: &'static str,
    pub level: LevelFilter,
    pub tags: &'static [&'static str],
}

impl TraceTarget {
    #[must_use]
    pub const fn new(
        name: &'static str,
        module: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            module,
            level,
            tags,
        }
    }
}

#[distributed_slice]
pub static TRACE_TARGETS: [TraceTarget];

/// Declare a trace target for the module where the macro is invoked.
///
/// ```ignore
/// trace_target!("k8s-client", LevelFilter::INFO, &["gateway"]);
/// ```
#[macro_export]
macro_rules! trace_target {
    ($name:expr, LevelFilter::$level:ident, $tags:expr) => {
        #[$crate::linkme::distributed_slice($crate::targets::TRACE_TARGETS)]
        #[linkme(crate = $crate::linkme)]
        static _TRACE_TARGET: $crate::targets::TraceTarget = $crate::targets::TraceTarget::new(
            $name,
            module_path!(),
            $crate::LevelFilter::$level,
            $tags,
        );
    };
}
