// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Waiting for conditions under a deadline

use k8s_intf::Poll;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, info, trace};

use crate::error::ObserveError;
use crate::expect::{Condition, Evaluation};

/// Evaluate `condition` until it holds. Transient errors keep polling; other errors end the
/// wait. A timeout reports the last observed state.
pub async fn wait_for(
    condition: &dyn Condition,
    poll: Poll,
    cancel: &CancellationToken,
) -> Result<Evaluation, ObserveError> {
    let what = condition.describe();
    let deadline = Instant::now() + poll.timeout;
    let mut last = String::from("nothing observed");
    debug!("waiting up to {:?} for {what}", poll.timeout);
    loop {
        match condition.evaluate().await {
            Ok(evaluation) if evaluation.done => {
                debug!("{what}: done ({})", evaluation.observed);
                return Ok(evaluation);
            }
            Ok(evaluation) => {
                trace!("{what}: not yet ({})", evaluation.observed);
                last = evaluation.observed;
            }
            Err(e) if e.is_transient() => {
                debug!("{what}: {e}, retrying");
                last = e.to_string();
            }
            Err(e) => return Err(e),
        }
        let next = Instant::now() + poll.interval;
        if next > deadline {
            return Err(ObserveError::Timeout {
                what,
                timeout: poll.timeout,
                last,
            });
        }
        tokio::select! {
            () = cancel.cancelled() => return Err(ObserveError::Cancelled(what)),
            () = sleep_until(next) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    /// Replays a list of outcomes, repeating the last one
    struct Script(Mutex<Vec<Result<Evaluation, ObserveError>>>);

    impl Script {
        fn new(mut steps: Vec<Result<Evaluation, ObserveError>>) -> Self {
            steps.reverse();
            Self(Mutex::new(steps))
        }
    }

    #[async_trait]
    impl Condition for Script {
        fn describe(&self) -> String {
            "scripted condition".to_string()
        }
        async fn evaluate(&self) -> Result<Evaluation, ObserveError> {
            let mut steps = self.0.lock();
            if steps.len() > 1 {
                steps.pop().unwrap_or(Ok(Evaluation::new(false, "")))
            } else {
                match steps.last() {
                    Some(Ok(e)) => Ok(e.clone()),
                    _ => Ok(Evaluation::new(false, "")),
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_wait_for_retries_transient() {
        let script = Script::new(vec![
            Err(ObserveError::EmptyOutput("show bgp summary json".into())),
            Ok(Evaluation::new(false, "10.0.0.2=Active")),
            Ok(Evaluation::new(true, "10.0.0.2=Established")),
        ]);
        let e = wait_for(&script, Poll::BGP, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(e.observed, "10.0.0.2=Established");
        assert!(logs_contain("retrying"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_timeout_reports_last_state() {
        let script = Script::new(vec![Ok(Evaluation::new(false, "10.0.0.2=Idle"))]);
        let poll = Poll::new(Duration::from_secs(20), Duration::from_secs(5));
        let err = wait_for(&script, poll, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ObserveError::Timeout { what, last, .. } => {
                assert_eq!(what, "scripted condition");
                assert_eq!(last, "10.0.0.2=Idle");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_parse_error_aborts() {
        let script = Script::new(vec![
            Err(ObserveError::Parse {
                command: "show bgp summary json".into(),
                reason: "expected value".into(),
                raw: "% Unknown command".into(),
            }),
            Ok(Evaluation::new(true, "")),
        ]);
        let err = wait_for(&script, Poll::BGP, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ObserveError::Parse { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_cancelled() {
        let script = Script::new(vec![Ok(Evaluation::new(false, ""))]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = wait_for(&script, Poll::BGP, &cancel).await.unwrap_err();
        assert!(matches!(err, ObserveError::Cancelled(_)));
    }
}
