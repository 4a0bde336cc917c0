//! Time source and cooperative cancellation.
//!
//! Every polling loop reads time and sleeps through a [`Clock`], so tests can
//! drive the state machine with [`ManualClock`] instead of real sleeps.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Upper bound on one uninterrupted real sleep, so cancellation is observed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token for every clone. Irreversible.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once any clone has called [`CancelToken::cancel`].
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Source of the current time and of sleeps, shared by every run.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;

    /// Sleep for `duration`, returning early if `cancel` fires.
    fn sleep(&self, duration: Duration, cancel: &CancelToken);
}

/// Wall clock with interruptible sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) {
        let mut remaining = duration;
        while !remaining.is_zero() && !cancel.is_cancelled() {
            let slice = remaining.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
        }
    }
}

/// Virtual clock: `sleep` advances time instantly.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// A clock frozen at `start` until slept on or advanced. Clones share the time.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move time forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += to_chrono(duration);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) {
        if !cancel.is_cancelled() {
            self.advance(duration);
        }
    }
}

/// Convert a std duration to chrono, saturating on overflow.
pub fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Elapsed time from `since` to `now` as a std duration (zero if negative).
pub fn elapsed_between(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_on_sleep() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.sleep(Duration::from_secs(5), &CancelToken::new());
        assert_eq!(elapsed_between(start, clock.now()), Duration::from_secs(5));
    }

    #[test]
    fn cancelled_sleep_does_not_advance() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let cancel = CancelToken::new();
        cancel.cancel();
        clock.sleep(Duration::from_secs(5), &cancel);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn system_sleep_returns_early_on_cancel() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let started = std::time::Instant::now();
        SystemClock.sleep(Duration::from_secs(10), &cancel);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn cancel_token_is_shared_across_clones() {
        let a = CancelToken::new();
        let b = a.clone();
        b.cancel();
        assert!(a.is_cancelled());
    }
}
