// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Runtime control of tracing verbosity.
//!
//! The controller owns a reloadable [`EnvFilter`]. Its directives are rebuilt from the
//! registered trace targets whenever a level changes.

use std::str::FromStr;
use std::sync::OnceLock;

use ordermap::OrderMap;
use parking_lot::Mutex;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Registry, fmt, reload};

use crate::display::TargetTable;
use crate::targets::TRACE_TARGETS;

pub const DEFAULT_DEFAULT_LOGLEVEL: LevelFilter = LevelFilter::INFO;

/// Tag to set the default level with `setup_from_string`
const DEFAULT_TAG: &str = "default";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TraceCtlError {
    #[error("Unknown tag '{0}'")]
    UnknownTag(String),
    #[error("Invalid log level '{0}'")]
    InvalidLevel(String),
    #[error("Invalid tracing directive '{0}'")]
    InvalidDirective(String),
    #[error("Failed to reload tracing filter: {0}")]
    ReloadFailed(String),
}

#[derive(Clone, Debug)]
pub(crate) struct TargetState {
    pub(crate) name: &'static str,
    pub(crate) module: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) tags: &'static [&'static str],
}

struct ControlState {
    default: LevelFilter,
    targets: OrderMap<&'static str, TargetState>,
}

impl ControlState {
    fn from_registry() -> Self {
        let mut targets = OrderMap::new();
        for t in TRACE_TARGETS.iter() {
            targets.insert(
                t.module,
                TargetState {
                    name: t.name,
                    module: t.module,
                    level: t.level,
                    tags: t.tags,
                },
            );
        }
        targets.sort_keys();
        Self {
            default: DEFAULT_DEFAULT_LOGLEVEL,
            targets,
        }
    }

    fn directives(&self) -> String {
        let mut out = self.default.to_string();
        for t in self.targets.values() {
            out += &format!(",{}={}", t.module, t.level);
        }
        out
    }

    fn set_tag_level(&mut self, tag: &str, level: LevelFilter) -> Result<(), TraceCtlError> {
        let mut found = false;
        for t in self.targets.values_mut() {
            if t.name == tag || t.tags.contains(&tag) {
                t.level = level;
                found = true;
            }
        }
        if found {
            Ok(())
        } else {
            Err(TraceCtlError::UnknownTag(tag.to_string()))
        }
    }
}

pub struct TracingControl {
    state: Mutex<ControlState>,
    reload: reload::Handle<EnvFilter, Registry>,
}

fn parse_level(level: &str) -> Result<LevelFilter, TraceCtlError> {
    match level {
        "warning" => Ok(LevelFilter::WARN),
        other => LevelFilter::from_str(other)
            .map_err(|_| TraceCtlError::InvalidLevel(other.to_string())),
    }
}

impl TracingControl {
    fn new() -> Self {
        let state = ControlState::from_registry();
        let filter = EnvFilter::try_new(state.directives())
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DEFAULT_LOGLEVEL.to_string()));
        let (filter, reload) = reload::Layer::new(filter);

        // a subscriber may already be installed (e.g. by tests); in that case
        // level changes are recorded but have no effect on output
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init();

        Self {
            state: Mutex::new(state),
            reload,
        }
    }

    fn apply(&self, state: &ControlState) -> Result<(), TraceCtlError> {
        let filter = EnvFilter::try_new(state.directives())
            .map_err(|e| TraceCtlError::InvalidDirective(e.to_string()))?;
        self.reload
            .reload(filter)
            .map_err(|e| TraceCtlError::ReloadFailed(e.to_string()))
    }

    /// Set the level for all events not covered by a registered target.
    pub fn set_default_level(&self, level: LevelFilter) -> Result<(), TraceCtlError> {
        let mut state = self.state.lock();
        state.default = level;
        self.apply(&state)
    }

    #[must_use]
    pub fn get_default_level(&self) -> LevelFilter {
        self.state.lock().default
    }

    /// Set the level of every target named `tag` or tagged with `tag`.
    pub fn set_tag_level(&self, tag: &str, level: LevelFilter) -> Result<(), TraceCtlError> {
        let mut state = self.state.lock();
        state.set_tag_level(tag, level)?;
        self.apply(&state)
    }

    /// Level of the target whose name is `name`, if registered.
    #[must_use]
    pub fn get_target_level(&self, name: &str) -> Option<LevelFilter> {
        self.state
            .lock()
            .targets
            .values()
            .find(|t| t.name == name)
            .map(|t| t.level)
    }

    /// Configure levels from a string like `"default=info,k8s-client=debug,observer=trace"`.
    /// The whole string is validated before any level is changed.
    pub fn setup_from_string(&self, input: &str) -> Result<(), TraceCtlError> {
        let mut state = self.state.lock();
        let mut staged = ControlState {
            default: state.default,
            targets: state.targets.clone(),
        };
        for item in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (tag, level) = item
                .split_once('=')
                .ok_or_else(|| TraceCtlError::InvalidDirective(item.to_string()))?;
            let level = parse_level(level.trim())?;
            match tag.trim() {
                DEFAULT_TAG => staged.default = level,
                tag => staged.set_tag_level(tag, level)?,
            }
        }
        self.apply(&staged)?;
        *state = staged;
        Ok(())
    }

    /// Table of the registered targets and their current levels
    #[must_use]
    pub fn as_string(&self) -> String {
        let state = self.state.lock();
        let targets: Vec<TargetState> = state.targets.values().cloned().collect();
        format!(
            " default level: {}\n{}",
            state.default,
            TargetTable(&targets)
        )
    }
}

static TRACE_CTL: OnceLock<TracingControl> = OnceLock::new();

/// Get the process-wide tracing controller. The first call installs the global subscriber.
pub fn get_trace_ctl() -> &'static TracingControl {
    TRACE_CTL.get_or_init(TracingControl::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    crate::trace_target!("tracectl-test", LevelFilter::WARN, &["tracectl-tests"]);

    #[test]
    #[serial]
    fn test_registered_target_is_known() {
        let tctl = get_trace_ctl();
        tctl.set_tag_level("tracectl-test", LevelFilter::WARN).unwrap();
        assert_eq!(
            tctl.get_target_level("tracectl-test"),
            Some(LevelFilter::WARN)
        );
        assert!(tctl.as_string().contains("tracectl-test"));
    }

    #[test]
    #[serial]
    fn test_setup_from_string() {
        let tctl = get_trace_ctl();
        tctl.setup_from_string("default=debug, tracectl-tests=trace")
            .unwrap();
        assert_eq!(tctl.get_default_level(), LevelFilter::DEBUG);
        assert_eq!(
            tctl.get_target_level("tracectl-test"),
            Some(LevelFilter::TRACE)
        );
        tctl.set_default_level(DEFAULT_DEFAULT_LOGLEVEL).unwrap();
    }

    #[test]
    #[serial]
    fn test_setup_from_string_is_atomic() {
        let tctl = get_trace_ctl();
        tctl.set_tag_level("tracectl-test", LevelFilter::WARN).unwrap();
        let result = tctl.setup_from_string("tracectl-test=error,no-such-tag=debug");
        assert_eq!(result, Err(TraceCtlError::UnknownTag("no-such-tag".into())));
        assert_eq!(
            tctl.get_target_level("tracectl-test"),
            Some(LevelFilter::WARN)
        );
    }

    #[test]
    #[serial]
    fn test_bad_level() {
        let tctl = get_trace_ctl();
        assert_eq!(
            tctl.setup_from_string("tracectl-test=loud"),
            Err(TraceCtlError::InvalidLevel("loud".into()))
        );
        assert_eq!(
            tctl.setup_from_string("tracectl-test"),
            Err(TraceCtlError::InvalidDirective("tracectl-test".into()))
        );
    }
}
