// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ordered suites of scenarios with before-all, after-each and after-all hooks

use std::fmt::Display;

use futures::future::BoxFuture;
#[allow(unused)]
use tracing::{error, info, warn};

use crate::driver::{Context, Driver, Outcome, Scenario, Verdict};
use crate::error::ScenarioError;

type HookFn<C> =
    Box<dyn for<'a> Fn(&'a mut C) -> BoxFuture<'a, Result<(), ScenarioError>> + Send + Sync>;

pub struct Hook<C> {
    label: String,
    action: HookFn<C>,
}

impl<C> Hook<C> {
    pub fn new<F>(label: &str, action: F) -> Self
    where
        F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, Result<(), ScenarioError>> + Send + Sync + 'static,
    {
        Self {
            label: label.to_owned(),
            action: Box::new(action),
        }
    }

    async fn run(&self, ctx: &mut C) -> Result<(), ScenarioError> {
        info!("hook: {}", self.label);
        (self.action)(ctx).await
    }
}

pub struct Suite<C: Context> {
    name: String,
    before_all: Vec<Hook<C>>,
    after_each: Vec<Hook<C>>,
    after_all: Vec<Hook<C>>,
    scenarios: Vec<Box<dyn Scenario<C>>>,
}

#[derive(Clone, Debug)]
pub struct SuiteReport {
    pub suite: String,
    pub outcomes: Vec<Outcome>,
    pub warnings: Vec<String>,
}

impl SuiteReport {
    fn count(&self, f: impl Fn(&Verdict) -> bool) -> usize {
        self.outcomes.iter().filter(|o| f(&o.verdict)).count()
    }

    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(|v| *v == Verdict::Pass)
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|v| matches!(v, Verdict::Skip(_)))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|v| matches!(v, Verdict::Fail { .. }))
    }
}

impl Display for SuiteReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{}: {} passed, {} skipped, {} failed",
            self.suite,
            self.passed(),
            self.skipped(),
            self.failed()
        )?;
        for o in &self.outcomes {
            writeln!(f, "  {}: {}", o.scenario, o.verdict)?;
            for w in &o.warnings {
                writeln!(f, "    warning: {w}")?;
            }
        }
        for w in &self.warnings {
            writeln!(f, "  warning: {w}")?;
        }
        Ok(())
    }
}

impl<C: Context> Suite<C> {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            before_all: vec![],
            after_each: vec![],
            after_all: vec![],
            scenarios: vec![],
        }
    }

    #[must_use]
    pub fn before_all(mut self, hook: Hook<C>) -> Self {
        self.before_all.push(hook);
        self
    }

    #[must_use]
    pub fn after_each(mut self, hook: Hook<C>) -> Self {
        self.after_each.push(hook);
        self
    }

    #[must_use]
    pub fn after_all(mut self, hook: Hook<C>) -> Self {
        self.after_all.push(hook);
        self
    }

    #[must_use]
    pub fn scenario(mut self, scenario: Box<dyn Scenario<C>>) -> Self {
        self.scenarios.push(scenario);
        self
    }

    /// Run every scenario in declaration order. Hooks run in declaration order; after-each
    /// and after-all hooks run even when something before them failed.
    pub async fn run(&self, driver: &Driver, ctx: &mut C) -> SuiteReport {
        let mut report = SuiteReport {
            suite: self.name.clone(),
            outcomes: vec![],
            warnings: vec![],
        };

        let mut setup_failure = None;
        for hook in &self.before_all {
            if let Err(e) = hook.run(ctx).await {
                error!("{}: before-all hook '{}' failed: {e}", self.name, hook.label);
                setup_failure = Some((hook.label.clone(), e));
                break;
            }
        }

        for scenario in &self.scenarios {
            let mut outcome = match &setup_failure {
                None => driver.run(ctx, scenario.as_ref()).await,
                Some((label, e)) => Outcome {
                    scenario: scenario.name().to_string(),
                    verdict: match e {
                        ScenarioError::Skip(reason) => Verdict::Skip(reason.clone()),
                        e => Verdict::Fail {
                            step: format!("before all: {label}"),
                            error: e.to_string(),
                            last_observed: None,
                        },
                    },
                    warnings: vec![],
                },
            };
            if setup_failure.is_none() {
                for hook in &self.after_each {
                    if let Err(e) = hook.run(ctx).await {
                        outcome.warnings.push(format!("after each: {}: {e}", hook.label));
                    }
                }
            }
            report.outcomes.push(outcome);
        }

        for hook in &self.after_all {
            if let Err(e) = hook.run(ctx).await {
                warn!("{}: after-all hook '{}' failed: {e}", self.name, hook.label);
                report.warnings.push(format!("after all: {}: {e}", hook.label));
            }
        }
        info!("{report}");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Steps;
    use crate::driver::fake::FakeContext;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct Named(&'static str, bool);

    #[async_trait]
    impl Scenario<FakeContext> for Named {
        fn name(&self) -> &'static str {
            self.0
        }
        async fn run(&self, ctx: &mut FakeContext, _steps: &mut Steps) -> Result<(), ScenarioError> {
            ctx.events.push(format!("run {}", self.0));
            if self.1 {
                Ok(())
            } else {
                Err(ScenarioError::Verify("prefix not learned".into()))
            }
        }
    }

    fn push(label: &'static str, ok: bool) -> Hook<FakeContext> {
        Hook::new(label, move |ctx: &mut FakeContext| {
            Box::pin(async move {
                ctx.events.push(label.to_string());
                if ok {
                    Ok(())
                } else {
                    Err(ScenarioError::Setup(format!("{label} failed")))
                }
            })
        })
    }

    fn filter(events: &[String]) -> Vec<&str> {
        events
            .iter()
            .map(String::as_str)
            .filter(|e| !e.starts_with("begin") && *e != "end")
            .collect()
    }

    #[tokio::test]
    async fn test_hooks_order() {
        let suite = Suite::new("bgp")
            .before_all(push("label workers", true))
            .after_each(push("clean namespace", false))
            .after_each(push("check residue", true))
            .after_all(push("unlabel workers", true))
            .scenario(Box::new(Named("one", true)))
            .scenario(Box::new(Named("two", false)));
        let mut ctx = FakeContext::default();
        let report = suite.run(&Driver::default(), &mut ctx).await;
        assert_eq!(
            filter(&ctx.events),
            vec![
                "label workers",
                "run one",
                "clean namespace",
                "check residue",
                "run two",
                "report two",
                "clean namespace",
                "check residue",
                "unlabel workers",
            ]
        );
        assert_eq!((report.passed(), report.failed()), (1, 1));
        assert_eq!(
            report.outcomes[0].warnings,
            vec!["after each: clean namespace: Setup failed: clean namespace failed"]
        );
    }

    #[tokio::test]
    async fn test_before_all_failure_fails_every_scenario() {
        let suite = Suite::new("bgp")
            .before_all(push("label workers", false))
            .before_all(push("never", true))
            .after_all(push("unlabel workers", true))
            .scenario(Box::new(Named("one", true)));
        let mut ctx = FakeContext::default();
        let report = suite.run(&Driver::default(), &mut ctx).await;
        assert_eq!(filter(&ctx.events), vec!["label workers", "unlabel workers"]);
        assert_eq!(report.failed(), 1);
        assert!(report.to_string().contains("before all: label workers"));
    }
}
