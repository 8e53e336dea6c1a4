//! Bounded predicate-poll primitive
//!
//! Every physically-actuated vehicle goal is awaited by polling a telemetry
//! predicate under a wall-clock budget. Timing out is a normal, reportable
//! outcome, not a fault: the result is a plain `bool` and the caller decides
//! what failure means.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Default wall-clock budget for an operation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default pause between predicate polls
pub const DEFAULT_POLL_GAP: Duration = Duration::from_millis(500);

/// One bounded vehicle operation: a goal predicate plus its wall-clock
/// budget. Built immutably per invocation and consumed by [`Operation::run`].
pub struct Operation<P> {
    label: String,
    predicate: P,
    timeout: Duration,
    poll_gap: Duration,
}

impl<P, Fut> Operation<P>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    pub fn new(label: impl Into<String>, predicate: P) -> Self {
        Self {
            label: label.into(),
            predicate,
            timeout: DEFAULT_TIMEOUT,
            poll_gap: DEFAULT_POLL_GAP,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_gap(mut self, poll_gap: Duration) -> Self {
        self.poll_gap = poll_gap;
        self
    }

    /// Poll the predicate until it holds or the budget is spent.
    ///
    /// Returns `true` the moment the predicate holds. Returns `false` once
    /// wall-clock time since the call exceeds the timeout; the predicate is
    /// always evaluated at least once, and the last evaluation starts no
    /// later than one poll gap past the timeout.
    pub async fn run(mut self) -> bool {
        debug!("Waiting for {} (budget {:?})", self.label, self.timeout);
        let started = Instant::now();

        loop {
            if (self.predicate)().await {
                debug!("{} satisfied after {:?}", self.label, started.elapsed());
                return true;
            }
            if started.elapsed() >= self.timeout {
                warn!(
                    "{} still unsatisfied after {:?}, giving up",
                    self.label, self.timeout
                );
                return false;
            }
            sleep(self.poll_gap).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_true_predicate_returns_immediately() {
        let op = Operation::new("instant goal", || async { true });
        assert!(op.run().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_true_predicate_times_out_within_budget() {
        let started = Instant::now();
        let op = Operation::new("unreachable goal", || async { false })
            .with_timeout(Duration::from_millis(100))
            .with_poll_gap(Duration::from_millis(30));

        assert!(!op.run().await);

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed <= Duration::from_millis(130));
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_is_polled_until_it_holds() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = polls.clone();
        let op = Operation::new("third poll", move || {
            let counter = counter.clone();
            async move { counter.fetch_add(1, Ordering::SeqCst) + 1 >= 3 }
        })
        .with_poll_gap(Duration::from_millis(10));

        assert!(op.run().await);
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_still_evaluates_once() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = polls.clone();
        let op = Operation::new("no budget", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                false
            }
        })
        .with_timeout(Duration::ZERO);

        assert!(!op.run().await);
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }
}
