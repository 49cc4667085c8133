//! Bounded polling used by the locator and the assertion engine.
//!
//! Every wait is a plain future: dropping it (for example when the run
//! deadline fires) cancels it between two probes.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Default polling interval (100ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Outcome of a single probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T, E> {
    /// Condition met
    Ready(T),
    /// Not yet; carries the latest observation for the timeout diagnostic
    Retry(E),
    /// Give up immediately
    Fail(E),
}

/// Why a wait ended without a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitError<E> {
    /// Deadline reached while the probe kept asking for a retry
    TimedOut(E),
    /// The probe failed hard
    Failed(E),
}

impl<E> WaitError<E> {
    /// Latest observation, whichever way the wait ended
    pub fn into_inner(self) -> E {
        match self {
            Self::TimedOut(e) | Self::Failed(e) => e,
        }
    }
}

/// Poll `probe` until it is ready, fails, or `deadline` passes.
///
/// The probe always runs at least once, so a deadline in the past still
/// checks current state. Sleeps never extend beyond the deadline.
pub async fn poll_until<T, E, F, Fut>(
    deadline: Instant,
    interval: Duration,
    mut probe: F,
) -> Result<T, WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Probe<T, E>>,
{
    loop {
        match probe().await {
            Probe::Ready(value) => return Ok(value),
            Probe::Fail(e) => return Err(WaitError::Failed(e)),
            Probe::Retry(e) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(WaitError::TimedOut(e));
                }
                let remaining = deadline - now;
                tokio::time::sleep(interval.min(remaining)).await;
            }
        }
    }
}

/// Deadline `ms` milliseconds after `start`
#[must_use]
pub fn deadline_after(start: Instant, ms: u64) -> Instant {
    start + Duration::from_millis(ms)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_first_probe() {
        let deadline = Instant::now();
        let result: Result<u32, WaitError<()>> =
            poll_until(deadline, Duration::from_millis(100), || async { Probe::Ready(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_probes_exactly_once() {
        let calls = Cell::new(0);
        let deadline = Instant::now();
        let result: Result<(), WaitError<&str>> =
            poll_until(deadline, Duration::from_millis(100), || {
                calls.set(calls.get() + 1);
                async { Probe::Retry("absent") }
            })
            .await;
        assert_eq!(result, Err(WaitError::TimedOut("absent")));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_ready() {
        let calls = Cell::new(0);
        let start = Instant::now();
        let result: Result<u32, WaitError<()>> = poll_until(
            deadline_after(start, 1000),
            Duration::from_millis(100),
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n >= 4 {
                        Probe::Ready(n)
                    } else {
                        Probe::Retry(())
                    }
                }
            },
        )
        .await;
        assert_eq!(result, Ok(4));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_sleeps_past_deadline() {
        let start = Instant::now();
        let result: Result<(), WaitError<()>> = poll_until(
            deadline_after(start, 250),
            Duration::from_millis(100),
            || async { Probe::Retry(()) },
        )
        .await;
        assert!(matches!(result, Err(WaitError::TimedOut(()))));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_stops_immediately() {
        let start = Instant::now();
        let result: Result<(), WaitError<&str>> = poll_until(
            deadline_after(start, 5000),
            Duration::from_millis(100),
            || async { Probe::Fail("ambiguous") },
        )
        .await;
        assert_eq!(result, Err(WaitError::Failed("ambiguous")));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
