// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Scenario driver.
//!
//! A scenario is a linear program of labeled steps run against a [`Context`]. Setup steps
//! register cleanups as they go; verification steps wait for a condition and remember what
//! they last observed. The setup steps of a scenario share one deadline. Whatever happens,
//! the registered cleanups run in reverse order on a fresh deadline, and their failures
//! become warnings that never change the verdict.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use k8s_intf::Poll;
use observer::{Condition, Evaluation, ObserveError, wait_for};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
#[allow(unused)]
use tracing::{error, info, info_span, warn};

use crate::error::ScenarioError;

/// Teardown deadline of a single cleanup
pub const DEFAULT_TEARDOWN_TIMEOUT: Duration = Duration::from_secs(120);
/// Deadline shared by all the setup steps of a scenario
pub const DEFAULT_SETUP_TIMEOUT: Duration = Poll::SETUP.timeout;

/// Something to undo when a scenario ends
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cleanup {
    /// delete the BGP resources of the operator namespace
    Namespace,
    /// remove routes, external pods, NADs and configmaps
    Harness,
    /// delete load balancer services and their backends
    Workloads,
    RouteAdvertisement(String),
    /// bring the switch ports back up and close the session
    Switch,
}

impl Display for Cleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cleanup::Namespace => write!(f, "namespace cleanup"),
            Cleanup::Harness => write!(f, "external FRR teardown"),
            Cleanup::Workloads => write!(f, "workload cleanup"),
            Cleanup::RouteAdvertisement(name) => write!(f, "route advertisement {name}"),
            Cleanup::Switch => write!(f, "switch ports"),
        }
    }
}

/// What scenarios run against
#[async_trait]
pub trait Context: Send + Sync {
    /// Prepare per scenario state. The returned token cancels the scenario's waits.
    fn begin(&mut self, scenario: &str) -> CancellationToken;
    /// Undo one thing. Never runs under the scenario's cancellation token.
    async fn cleanup(&mut self, cleanup: &Cleanup) -> Result<(), ScenarioError>;
    /// Collect diagnostics after a failure; returns warnings
    async fn report(&mut self, scenario: &str) -> Vec<String>;
    /// Release per scenario resources that must not outlive it; returns warnings
    async fn end(&mut self) -> Vec<String>;
}

#[async_trait]
pub trait Scenario<C: Context>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fail with [`ScenarioError::Skip`] when the scenario cannot run on this cluster
    async fn preconditions(&self, _ctx: &C) -> Result<(), ScenarioError> {
        Ok(())
    }

    async fn run(&self, ctx: &mut C, steps: &mut Steps) -> Result<(), ScenarioError>;
}

/// Step bookkeeping of a running scenario
#[derive(Debug)]
pub struct Steps {
    scenario: String,
    current: String,
    cleanups: Vec<Cleanup>,
    last_observed: Option<String>,
    setup_timeout: Duration,
    /// what the setup steps still have of `setup_timeout`
    setup_left: Duration,
}

impl Steps {
    #[must_use]
    pub fn new(scenario: &str) -> Self {
        Self::with_setup_timeout(scenario, DEFAULT_SETUP_TIMEOUT)
    }

    #[must_use]
    pub fn with_setup_timeout(scenario: &str, setup_timeout: Duration) -> Self {
        Self {
            scenario: scenario.to_owned(),
            current: "start".to_owned(),
            cleanups: vec![],
            last_observed: None,
            setup_timeout,
            setup_left: setup_timeout,
        }
    }

    fn enter(&mut self, label: &str) -> tracing::Span {
        label.clone_into(&mut self.current);
        info!("[{}] {label}", self.scenario);
        info_span!("step", scenario = %self.scenario, step = %label)
    }

    /// Register a cleanup. Cleanups run last registered first.
    pub fn defer(&mut self, cleanup: Cleanup) {
        if !self.cleanups.contains(&cleanup) {
            self.cleanups.push(cleanup);
        }
    }

    /// Run a setup action within what is left of the setup deadline
    pub async fn setup<T, E, F>(&mut self, label: &str, action: F) -> Result<T, ScenarioError>
    where
        E: Into<ScenarioError>,
        F: Future<Output = Result<T, E>>,
    {
        let span = self.enter(label);
        let started = Instant::now();
        let result = tokio::time::timeout(self.setup_left, action.instrument(span)).await;
        self.setup_left = self.setup_left.saturating_sub(started.elapsed());
        match result {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(ScenarioError::Setup(format!(
                "setup did not complete within {:?}",
                self.setup_timeout
            ))),
        }
    }

    /// Wait until `condition` holds
    pub async fn verify(
        &mut self,
        label: &str,
        condition: &dyn Condition,
        poll: Poll,
        cancel: &CancellationToken,
    ) -> Result<Evaluation, ScenarioError> {
        let span = self.enter(label);
        match wait_for(condition, poll, cancel).instrument(span).await {
            Ok(evaluation) => {
                self.last_observed = Some(evaluation.observed.clone());
                Ok(evaluation)
            }
            Err(e) => {
                if let ObserveError::Timeout { last, .. } = &e {
                    self.last_observed = Some(last.clone());
                }
                Err(e.into())
            }
        }
    }

    /// Fail the current step unless `check` holds
    pub fn ensure(&mut self, label: &str, check: bool, observed: impl Display) -> Result<(), ScenarioError> {
        let _span = self.enter(label).entered();
        self.last_observed = Some(observed.to_string());
        if check {
            Ok(())
        } else {
            Err(ScenarioError::Verify(format!("{label}: observed {observed}")))
        }
    }

    #[must_use]
    pub fn current(&self) -> &str {
        &self.current
    }

    #[must_use]
    pub fn cleanups(&self) -> &[Cleanup] {
        &self.cleanups
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Skip(String),
    Fail {
        step: String,
        error: String,
        last_observed: Option<String>,
    },
}

impl Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Skip(reason) => write!(f, "SKIP ({reason})"),
            Verdict::Fail {
                step,
                error,
                last_observed,
            } => {
                write!(f, "FAIL at '{step}': {error}")?;
                if let Some(last) = last_observed {
                    write!(f, " [last observed: {last}]")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub scenario: String,
    pub verdict: Verdict,
    /// teardown and reporting problems
    pub warnings: Vec<String>,
}

impl Outcome {
    #[must_use]
    pub fn failed(&self) -> bool {
        matches!(self.verdict, Verdict::Fail { .. })
    }
}

#[derive(Clone, Debug)]
pub struct Driver {
    teardown_timeout: Duration,
    setup_timeout: Duration,
}

impl Default for Driver {
    fn default() -> Self {
        Self {
            teardown_timeout: DEFAULT_TEARDOWN_TIMEOUT,
            setup_timeout: DEFAULT_SETUP_TIMEOUT,
        }
    }
}

impl Driver {
    #[must_use]
    pub fn new(teardown_timeout: Duration) -> Self {
        Self {
            teardown_timeout,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_setup_timeout(mut self, setup_timeout: Duration) -> Self {
        self.setup_timeout = setup_timeout;
        self
    }

    /// Run the cleanups of `steps`, last registered first. Every cleanup runs.
    pub async fn teardown<C: Context>(&self, ctx: &mut C, steps: &mut Steps) -> Vec<String> {
        let mut warnings = vec![];
        while let Some(cleanup) = steps.cleanups.pop() {
            match tokio::time::timeout(self.teardown_timeout, ctx.cleanup(&cleanup)).await {
                Ok(Ok(())) => info!("Teardown: {cleanup} done"),
                Ok(Err(e)) => warnings.push(format!("{cleanup}: {e}")),
                Err(_) => warnings.push(format!(
                    "{cleanup}: did not complete within {:?}",
                    self.teardown_timeout
                )),
            }
        }
        for w in &warnings {
            warn!("Teardown: {w}");
        }
        warnings
    }

    pub async fn run<C: Context>(&self, ctx: &mut C, scenario: &dyn Scenario<C>) -> Outcome {
        let name = scenario.name();
        let span = info_span!("scenario", name);
        self.run_inner(ctx, scenario, name).instrument(span).await
    }

    async fn run_inner<C: Context>(&self, ctx: &mut C, scenario: &dyn Scenario<C>, name: &str) -> Outcome {
        if let Err(e) = scenario.preconditions(ctx).await {
            let verdict = match e {
                ScenarioError::Skip(reason) => Verdict::Skip(reason),
                e => Verdict::Fail {
                    step: "preconditions".to_string(),
                    error: e.to_string(),
                    last_observed: None,
                },
            };
            info!("{name}: {verdict}");
            return Outcome {
                scenario: name.to_string(),
                verdict,
                warnings: vec![],
            };
        }

        let cancel = ctx.begin(name);
        let mut steps = Steps::with_setup_timeout(name, self.setup_timeout);
        let result = scenario.run(ctx, &mut steps).await;
        cancel.cancel();

        let mut warnings = vec![];
        let verdict = match result {
            Ok(()) => Verdict::Pass,
            Err(ScenarioError::Skip(reason)) => Verdict::Skip(reason),
            Err(e) => {
                error!("{name}: step '{}' failed: {e}", steps.current());
                warnings.extend(ctx.report(name).await);
                Verdict::Fail {
                    step: steps.current().to_string(),
                    error: e.to_string(),
                    last_observed: steps.last_observed.clone(),
                }
            }
        };
        warnings.extend(self.teardown(ctx, &mut steps).await);
        warnings.extend(ctx.end().await);
        info!("{name}: {verdict}");
        Outcome {
            scenario: name.to_string(),
            verdict,
            warnings,
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    /// Records what the driver asks of it
    #[derive(Debug, Default)]
    pub(crate) struct FakeContext {
        pub(crate) events: Vec<String>,
        pub(crate) failing_cleanups: Vec<Cleanup>,
        pub(crate) cancel: CancellationToken,
    }

    #[async_trait]
    impl Context for FakeContext {
        fn begin(&mut self, scenario: &str) -> CancellationToken {
            self.events.push(format!("begin {scenario}"));
            self.cancel = CancellationToken::new();
            self.cancel.clone()
        }

        async fn cleanup(&mut self, cleanup: &Cleanup) -> Result<(), ScenarioError> {
            self.events.push(format!("cleanup {cleanup}"));
            if self.failing_cleanups.contains(cleanup) {
                Err(ScenarioError::Setup("boom".to_string()))
            } else {
                Ok(())
            }
        }

        async fn report(&mut self, scenario: &str) -> Vec<String> {
            self.events.push(format!("report {scenario}"));
            vec![]
        }

        async fn end(&mut self) -> Vec<String> {
            self.events.push("end".to_string());
            vec![]
        }
    }
}
