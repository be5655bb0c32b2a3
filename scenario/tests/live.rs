// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Runs against the cluster of `ECO_METALLB_KUBECONFIG` or `KUBECONFIG`, with MetalLB and
//! FRR-K8s installed. Run with `--ignored`.

use config::EnvConfig;
use config::model::Family;
use metallb_e2e_scenario::scenarios::{SessionRestore, bgp_suite};
use metallb_e2e_scenario::{Driver, ScenarioContext, Verdict};
use serial_test::serial;
use tokio_util::sync::CancellationToken;

async fn context() -> ScenarioContext {
    let env = EnvConfig::load().expect("configuration should load");
    metallb_e2e_scenario::init_logging(&env).expect("log levels should parse");
    ScenarioContext::connect(env, CancellationToken::new())
        .await
        .expect("cluster should be reachable")
}

#[tokio::test]
#[ignore = "needs a cluster"]
#[serial]
async fn test_session_restore_ipv4() {
    let mut ctx = context().await;
    let outcome = Driver::default()
        .run(&mut ctx, &SessionRestore { family: Family::Ipv4 })
        .await;
    assert!(
        matches!(outcome.verdict, Verdict::Pass | Verdict::Skip(_)),
        "{}",
        outcome.verdict
    );
    assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
}

#[tokio::test]
#[ignore = "needs a cluster"]
#[serial]
async fn test_bgp_suite() {
    let mut ctx = context().await;
    let report = bgp_suite().run(&Driver::default(), &mut ctx).await;
    assert_eq!(report.failed(), 0, "{report}");
}
