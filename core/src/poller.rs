//! Bounded readiness polling for asynchronous server-side work.
//!
//! # Design
//! The poller is a two-outcome state machine: it stays in `Polling` while the
//! status check answers 404 and ends in `Ready` or `TimedOut`. Any status
//! other than 404 counts as ready, including 5xx: a 500 during dataset
//! ingestion ends the poll as "ready". Callers that care must inspect the
//! resource afterwards.
//!
//! Transport failures are not retried. They end the poll and propagate.
//!
//! Each wait is capped at the time left before the deadline, so a poll never
//! runs past its timeout by more than one interval. A wait that returns early
//! is not an error: the loop goes on to the deadline check and, with time
//! left, issues the next check.

use std::cell::Cell;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::http::NOT_FOUND;

/// Time source and sleeper used by the poller.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock that only moves when slept on. Useful for driving the poller
/// deterministically.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Cell<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }

    fn sleep(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready,
    TimedOut,
}

impl PollOutcome {
    pub fn is_ready(self) -> bool {
        self == PollOutcome::Ready
    }
}

#[derive(Debug, Clone)]
pub struct ReadinessPoller<C = SystemClock> {
    timeout: Duration,
    interval: Duration,
    clock: C,
}

impl ReadinessPoller<SystemClock> {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self::with_clock(timeout, interval, SystemClock)
    }
}

impl<C: Clock> ReadinessPoller<C> {
    pub fn with_clock(timeout: Duration, interval: Duration, clock: C) -> Self {
        Self {
            timeout,
            interval,
            clock,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// `Ok(true)` once `check` returns a status other than 404, `Ok(false)`
    /// if the timeout elapses first.
    pub fn poll<E, F>(&self, check: F) -> Result<bool, E>
    where
        F: FnMut() -> Result<u16, E>,
    {
        Ok(self.run(check)?.is_ready())
    }

    pub fn run<E, F>(&self, mut check: F) -> Result<PollOutcome, E>
    where
        F: FnMut() -> Result<u16, E>,
    {
        let started = self.clock.now();
        // A timeout too large to represent never expires.
        let deadline = started.checked_add(self.timeout);
        let mut checks = 0u32;

        loop {
            let status = check()?;
            checks += 1;
            debug!(checks, status, "readiness check");
            if status != NOT_FOUND {
                return Ok(PollOutcome::Ready);
            }

            let now = self.clock.now();
            let wait = match deadline {
                Some(deadline) if now >= deadline => break,
                Some(deadline) => self.interval.min(deadline - now),
                None => self.interval,
            };
            self.clock.sleep(wait);

            if deadline.is_some_and(|deadline| self.clock.now() >= deadline) {
                break;
            }
        }

        warn!(
            checks,
            timeout_ms = self.timeout.as_millis() as u64,
            "resource not ready before timeout"
        );
        Ok(PollOutcome::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    const MS: Duration = Duration::from_millis(1);

    fn poller(timeout_ms: u32, interval_ms: u32) -> ReadinessPoller<ManualClock> {
        ReadinessPoller::with_clock(timeout_ms * MS, interval_ms * MS, ManualClock::new())
    }

    /// Answers 404 for the first `not_found` calls, then `then`.
    fn scripted(
        not_found: u32,
        then: u16,
        calls: &Cell<u32>,
    ) -> impl FnMut() -> Result<u16, Infallible> + '_ {
        move || {
            calls.set(calls.get() + 1);
            Ok(if calls.get() <= not_found { NOT_FOUND } else { then })
        }
    }

    #[test]
    fn becomes_ready_after_three_not_found() {
        let calls = Cell::new(0);
        let p = poller(500, 100);
        assert!(p.poll(scripted(3, 200, &calls)).unwrap());
        assert!((3..=5).contains(&calls.get()), "calls = {}", calls.get());
        assert_eq!(calls.get(), 4);
        assert_eq!(p.clock().elapsed(), 300 * MS);
    }

    #[test]
    fn times_out_when_always_not_found() {
        let calls = Cell::new(0);
        let p = poller(200, 100);
        assert!(!p.poll(scripted(u32::MAX, 200, &calls)).unwrap());
        assert_eq!(calls.get(), 2);
        assert!(p.clock().elapsed() <= 300 * MS);
        assert_eq!(p.clock().elapsed(), 200 * MS);
    }

    #[test]
    fn ready_on_first_check_does_not_wait() {
        let calls = Cell::new(0);
        let p = poller(1_000, 100);
        assert_eq!(p.run(scripted(0, 200, &calls)).unwrap(), PollOutcome::Ready);
        assert_eq!(calls.get(), 1);
        assert_eq!(p.clock().elapsed(), Duration::ZERO);
    }

    // Known coarse edge: a server error ends the poll as ready.
    #[test]
    fn server_error_counts_as_ready() {
        let calls = Cell::new(0);
        let p = poller(500, 100);
        assert!(p.poll(scripted(1, 500, &calls)).unwrap());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn last_wait_is_capped_at_the_deadline() {
        let calls = Cell::new(0);
        let p = poller(250, 100);
        assert!(!p.poll(scripted(u32::MAX, 200, &calls)).unwrap());
        assert_eq!(calls.get(), 3);
        assert_eq!(p.clock().elapsed(), 250 * MS);
    }

    #[test]
    fn zero_timeout_checks_once() {
        let calls = Cell::new(0);
        let p = poller(0, 100);
        assert!(!p.poll(scripted(u32::MAX, 200, &calls)).unwrap());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn check_error_propagates_without_retry() {
        let calls = Cell::new(0);
        let p = poller(500, 100);
        let result: Result<bool, &str> = p.poll(|| {
            calls.set(calls.get() + 1);
            Err("connection refused")
        });
        assert_eq!(result, Err("connection refused"));
        assert_eq!(calls.get(), 1);
    }

    /// Wakes after at most 30ms regardless of the requested duration.
    struct EarlyWakeClock(ManualClock);

    impl Clock for EarlyWakeClock {
        fn now(&self) -> Instant {
            self.0.now()
        }

        fn sleep(&self, duration: Duration) {
            self.0.sleep(duration.min(30 * MS));
        }
    }

    #[test]
    fn early_wake_up_keeps_polling_until_deadline() {
        let calls = Cell::new(0);
        let p = ReadinessPoller::with_clock(200 * MS, 100 * MS, EarlyWakeClock(ManualClock::new()));
        assert!(!p.poll(scripted(u32::MAX, 200, &calls)).unwrap());
        assert_eq!(calls.get(), 7);
        assert_eq!(p.clock().0.elapsed(), 200 * MS);
    }

    #[test]
    fn system_clock_poll_respects_timeout() {
        let calls = Cell::new(0);
        let p = ReadinessPoller::new(200 * MS, 100 * MS);
        let started = Instant::now();
        assert!(!p.poll(scripted(u32::MAX, 200, &calls)).unwrap());
        let elapsed = started.elapsed();
        assert!(elapsed >= 200 * MS);
        assert!(elapsed < 300 * MS + 200 * MS, "elapsed = {elapsed:?}");
        assert!((1..=3).contains(&calls.get()));
    }
}
