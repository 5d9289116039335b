//! Generic "call until true or out of time" polling.

use crate::error::{PaygenError, Result};
use crate::ports::PortFuture;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Sleep used when `period` overflows the clock and no deadline bounds it.
const UNREPRESENTABLE_PERIOD_FALLBACK: Duration = Duration::from_secs(86_400 * 365);

/// Something that can be asked, repeatedly, whether a condition holds.
pub trait ReadinessProbe: Send {
    fn probe(&mut self) -> PortFuture<'_, bool>;
}

impl<F, Fut> ReadinessProbe for F
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    fn probe(&mut self) -> PortFuture<'_, bool> {
        Box::pin((self)())
    }
}

/// Call `probe` now and then once per `period` until it returns `true`.
///
/// Cycles start `period` apart regardless of how long a probe takes. The
/// last probe runs at the deadline itself; if it is still false the wait
/// fails. A `timeout` of `None`, or one past the end of the clock, polls
/// forever.
///
/// # Errors
/// Returns `PaygenError::PollTimeout` once `timeout` has elapsed, or the first
/// error returned by the probe.
pub async fn wait_for_return_true<P>(
    probe: &mut P,
    timeout: Option<Duration>,
    period: Duration,
) -> Result<()>
where
    P: ReadinessProbe + ?Sized,
{
    let start = Instant::now();
    // A timeout too large to represent as an instant means no deadline.
    let deadline = timeout.and_then(|limit| start.checked_add(limit));
    let mut attempt: u64 = 0;

    loop {
        let cycle_start = Instant::now();
        attempt = attempt.saturating_add(1);
        if probe.probe().await? {
            debug!(attempt, "condition met");
            return Ok(());
        }

        let next_cycle = cycle_start.checked_add(period);
        match (deadline, next_cycle) {
            (Some(deadline), _) if Instant::now() >= deadline => {
                debug!(attempt, "condition not met before deadline");
                return Err(PaygenError::PollTimeout {
                    timeout_secs: timeout.map_or(0, |limit| limit.as_secs()),
                });
            }
            (Some(deadline), Some(next)) => tokio::time::sleep_until(next.min(deadline)).await,
            (Some(deadline), None) => tokio::time::sleep_until(deadline).await,
            (None, Some(next)) => tokio::time::sleep_until(next).await,
            (None, None) => tokio::time::sleep(UNREPRESENTABLE_PERIOD_FALLBACK).await,
        }
    }
}
