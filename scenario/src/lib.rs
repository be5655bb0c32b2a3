// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! BGP end to end scenarios for MetalLB and FRR-K8s.
//!
//! A [`Suite`] runs [`Scenario`]s through the [`Driver`] against a [`ScenarioContext`] bound
//! to a live cluster. Scenarios skip when the cluster or the configuration cannot support
//! them, and always leave the cluster the way they found it.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod context;
pub mod driver;
pub mod error;
pub mod preconditions;
pub mod report;
pub mod scenarios;
pub mod suite;
pub mod switch;
pub mod workload;

use config::EnvConfig;
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{error, info};

pub use context::ScenarioContext;
pub use driver::{Cleanup, Context, Driver, Outcome, Scenario, Steps, Verdict};
pub use error::ScenarioError;
pub use suite::{Hook, Suite, SuiteReport};

use tracectl::{get_trace_ctl, trace_target};
trace_target!("scenario", LevelFilter::INFO, &["scenario"]);

/// Log levels applied at suite start, e.g. `default=info,observer=debug`
pub const LOG_VAR: &str = "METALLB_E2E_LOG";

/// Apply the log levels of [`LOG_VAR`], or else those of the configuration
pub fn init_logging(env: &EnvConfig) -> Result<(), ScenarioError> {
    let tctl = get_trace_ctl();
    let levels = std::env::var(LOG_VAR).ok().or_else(|| env.log.clone());
    if let Some(levels) = levels {
        tctl.setup_from_string(&levels)
            .map_err(|e| ScenarioError::Setup(format!("{LOG_VAR}: {e}")))?;
    }
    info!("Tracing levels:\n{}", tctl.as_string());
    Ok(())
}

/// Connect to the configured cluster and run the BGP suite. Cancelling `cancel` stops
/// the waits of the running scenario; teardown still runs.
pub async fn run_bgp_suite(env: EnvConfig, cancel: CancellationToken) -> Result<SuiteReport, ScenarioError> {
    init_logging(&env)?;
    let mut ctx = ScenarioContext::connect(env, cancel).await?;
    Ok(scenarios::bgp_suite().run(&Driver::default(), &mut ctx).await)
}
