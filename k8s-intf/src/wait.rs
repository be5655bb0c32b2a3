// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Deadlines and polling

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, trace};

use crate::error::GatewayError;

/// How long to wait for a condition and how often to check it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Poll {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Poll {
    /// Default deadline for resources to converge
    pub const DEFAULT: Poll = Poll::new(Duration::from_secs(180), Duration::from_secs(3));
    /// BGP sessions and routes
    pub const BGP: Poll = Poll::new(Duration::from_secs(60), Duration::from_secs(5));
    /// Machine config pools
    pub const MCP: Poll = Poll::new(Duration::from_secs(35 * 60), Duration::from_secs(60));
    /// Whole scenario setup
    pub const SETUP: Poll = Poll::new(Duration::from_secs(300), Duration::from_secs(3));
    /// Network attachment definitions to show up
    pub const NAD: Poll = Poll::new(Duration::from_secs(5), Duration::from_secs(1));

    #[must_use]
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

/// Call `attempt` until it yields a value, the deadline passes or `cancel` fires.
/// Transient errors are retried; fatal ones end the wait.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    poll: Poll,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, GatewayError>>,
{
    let deadline = Instant::now() + poll.timeout;
    loop {
        match attempt().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => trace!("{what}: not yet"),
            Err(e) if e.is_transient() => debug!("{what}: {e}, retrying"),
            Err(e) => return Err(e),
        }
        let next = Instant::now() + poll.interval;
        if next > deadline {
            return Err(GatewayError::WaitTimeout(what.to_string(), poll.timeout));
        }
        tokio::select! {
            () = cancel.cancelled() => return Err(GatewayError::Cancelled(what.to_string())),
            () = sleep_until(next) => {}
        }
    }
}
