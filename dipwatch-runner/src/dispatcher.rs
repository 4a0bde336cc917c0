//! Admission, dedup and scheduling of decision runs.
//!
//! The dispatcher owns a private rayon pool (not the global one). Each admitted
//! WorkKey gets exactly one run on it; excess work queues inside the pool, so
//! the number of concurrent pollers never exceeds the worker count.
//!
//! Finalization order per run: journal write, then (Notified only) enqueue the
//! message. A key whose journal write fails is never notified.

use crate::notify::{MessageTemplate, NotificationQueue};
use crate::store::WorkSet;
use dipwatch_core::{
    parse_metric, CancelToken, DecisionEngine, Identifier, Outcome, RunError, WorkKey,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("invalid dispatcher configuration: {0}")]
    InvalidConfig(String),
}

/// Result of offering one identifier to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Duplicate,
    /// Input was unusable or could not be recorded. Nothing was scheduled.
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub workers: usize,
    pub template: MessageTemplate,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            template: MessageTemplate::default(),
        }
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub accepted: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub notified: usize,
    pub abandoned: usize,
    pub cancelled: usize,
    /// Runs skipped because the key was already journaled.
    pub skipped: usize,
    pub store_failures: usize,
}

#[derive(Default)]
struct Counters {
    accepted: AtomicUsize,
    duplicates: AtomicUsize,
    rejected: AtomicUsize,
    notified: AtomicUsize,
    abandoned: AtomicUsize,
    cancelled: AtomicUsize,
    skipped: AtomicUsize,
    store_failures: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// State shared between the dispatcher handle and its workers.
struct Shared {
    engine: Arc<DecisionEngine>,
    admitted: Arc<dyn WorkSet>,
    journal: Arc<dyn WorkSet>,
    queue: Arc<NotificationQueue>,
    template: MessageTemplate,
    cancel: CancelToken,
    /// Keys scheduled or running.
    active: Mutex<HashSet<WorkKey>>,
    idle: Condvar,
    counters: Counters,
}

impl Shared {
    fn active(&self) -> MutexGuard<'_, HashSet<WorkKey>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn run(&self, key: &WorkKey) {
        if self.cancel.is_cancelled() {
            bump(&self.counters.cancelled);
            return;
        }
        if self.journal.contains(key) {
            tracing::debug!(key = %key, "already journaled, skipping run");
            bump(&self.counters.skipped);
            return;
        }

        tracing::info!(id = %key.identifier(), reference = key.reference(), "run started");
        match self.engine.run(key, &self.cancel) {
            Ok(report) => self.finalize(key, report.outcome),
            Err(RunError::Cancelled { phase }) => {
                tracing::info!(key = %key, %phase, "run cancelled");
                bump(&self.counters.cancelled);
            }
        }
    }

    fn finalize(&self, key: &WorkKey, outcome: Outcome) {
        match self.journal.add(key.clone()) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(key = %key, "key journaled by another run, dropping outcome");
                return;
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "journal write failed, outcome not notified");
                bump(&self.counters.store_failures);
                return;
            }
        }

        if outcome.is_notified() {
            bump(&self.counters.notified);
            if let Err(e) = self.queue.enqueue(self.template.render(key)) {
                tracing::error!(key = %key, error = %e, "failed to enqueue notification");
            }
        } else {
            bump(&self.counters.abandoned);
        }
    }

    fn release(&self, key: &WorkKey) {
        let mut active = self.active();
        active.remove(key);
        if active.is_empty() {
            self.idle.notify_all();
        }
    }
}

/// Removes the key from the active set when the run ends, panics included.
struct ActiveGuard<'a> {
    shared: &'a Shared,
    key: &'a WorkKey,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.shared.release(self.key);
    }
}

/// Admits work keys and runs each one to an outcome on a private worker pool.
///
/// Dropping the dispatcher shuts it down.
pub struct Dispatcher {
    shared: Arc<Shared>,
    pool: rayon::ThreadPool,
}

impl Dispatcher {
    /// Build the worker pool. Zero workers is a configuration error.
    pub fn new(
        engine: Arc<DecisionEngine>,
        admitted: Arc<dyn WorkSet>,
        journal: Arc<dyn WorkSet>,
        queue: Arc<NotificationQueue>,
        config: DispatcherConfig,
    ) -> Result<Self, DispatchError> {
        if config.workers == 0 {
            return Err(DispatchError::InvalidConfig("workers must be > 0".into()));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("dipwatch-worker-{i}"))
            .panic_handler(|_| tracing::error!("decision run panicked"))
            .build()?;

        tracing::info!(workers = config.workers, "dispatcher ready");
        Ok(Self {
            shared: Arc::new(Shared {
                engine,
                admitted,
                journal,
                queue,
                template: config.template,
                cancel: CancelToken::new(),
                active: Mutex::new(HashSet::new()),
                idle: Condvar::new(),
                counters: Counters::default(),
            }),
            pool,
        })
    }

    /// Offer one identifier with its reference metric text.
    pub fn admit(&self, identifier: &str, reference: &str) -> Admission {
        let key = match parse_key(identifier, reference) {
            Ok(key) => key,
            Err(reason) => {
                tracing::info!(identifier, reference, reason = %reason, "admission rejected");
                bump(&self.shared.counters.rejected);
                return Admission::Rejected(reason);
            }
        };

        if self.shared.cancel.is_cancelled() {
            bump(&self.shared.counters.rejected);
            return Admission::Rejected("dispatcher is shutting down".into());
        }

        if self.shared.journal.contains(&key) {
            bump(&self.shared.counters.duplicates);
            return Admission::Duplicate;
        }

        match self.shared.admitted.add(key.clone()) {
            Ok(true) => {}
            Ok(false) => {
                bump(&self.shared.counters.duplicates);
                return Admission::Duplicate;
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "failed to record admission");
                bump(&self.shared.counters.rejected);
                return Admission::Rejected(format!("storage failure: {e}"));
            }
        }

        tracing::info!(id = %key.identifier(), reference = key.reference(), "admitted");
        bump(&self.shared.counters.accepted);
        self.schedule(key);
        Admission::Accepted
    }

    /// Schedule every admitted key that has no journal entry. Returns how many were scheduled.
    pub fn resume_pending(&self) -> usize {
        let pending: Vec<WorkKey> = self
            .shared
            .admitted
            .snapshot()
            .into_iter()
            .filter(|k| !self.shared.journal.contains(k))
            .collect();

        let scheduled = pending.into_iter().filter(|k| self.schedule(k.clone())).count();
        if scheduled > 0 {
            tracing::info!(scheduled, "resumed pending work keys");
        }
        scheduled
    }

    /// Returns false if a run for `key` is already queued or running.
    fn schedule(&self, key: WorkKey) -> bool {
        if self.shared.cancel.is_cancelled() {
            return false;
        }
        if !self.shared.active().insert(key.clone()) {
            return false;
        }
        let shared = Arc::clone(&self.shared);
        self.pool.spawn(move || {
            let _guard = ActiveGuard {
                shared: &shared,
                key: &key,
            };
            shared.run(&key);
        });
        true
    }

    /// Every admitted key, in admission order.
    pub fn contracts(&self) -> Vec<WorkKey> {
        self.shared.admitted.snapshot()
    }

    /// Every finalized key, in finalization order.
    pub fn journal(&self) -> Vec<WorkKey> {
        self.shared.journal.snapshot()
    }

    /// Number of runs queued or in flight.
    pub fn active(&self) -> usize {
        self.shared.active().len()
    }

    /// Block until no run is queued or in flight.
    pub fn wait_idle(&self) {
        let mut active = self.shared.active();
        while !active.is_empty() {
            active = self
                .shared
                .idle
                .wait(active)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Cancel every run and wait for the workers to return. Cancelled runs write nothing.
    pub fn shutdown(&self) {
        if !self.shared.cancel.is_cancelled() {
            tracing::info!(active = self.active(), "dispatcher shutting down");
            self.shared.cancel.cancel();
        }
        self.wait_idle();
    }

    /// Snapshot of the admission and run counters.
    pub fn stats(&self) -> DispatchStats {
        let c = &self.shared.counters;
        let load = |a: &AtomicUsize| a.load(Ordering::Relaxed);
        DispatchStats {
            accepted: load(&c.accepted),
            duplicates: load(&c.duplicates),
            rejected: load(&c.rejected),
            notified: load(&c.notified),
            abandoned: load(&c.abandoned),
            cancelled: load(&c.cancelled),
            skipped: load(&c.skipped),
            store_failures: load(&c.store_failures),
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Validate and normalize one admission request into a WorkKey.
pub fn parse_key(identifier: &str, reference: &str) -> Result<WorkKey, String> {
    let id = Identifier::new(identifier).ok_or_else(|| "identifier is empty".to_string())?;
    let value = parse_metric(reference).map_err(|e| format!("invalid reference metric: {e}"))?;
    if value < 0.0 {
        return Err(format!("reference metric is negative: {value}"));
    }
    Ok(WorkKey::new(id, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_key_trims_and_scales() {
        let key = parse_key("  So1abc \n", "$50K").unwrap();
        assert_eq!(key.identifier().as_str(), "So1abc");
        assert_eq!(key.reference(), 50_000.0);
    }

    #[test]
    fn parse_key_rejects_bad_input() {
        assert!(parse_key("   ", "1k").is_err());
        assert!(parse_key("X", "").is_err());
        assert!(parse_key("X", "null").is_err());
        assert!(parse_key("X", "lots").is_err());
        assert!(parse_key("X", "-5").is_err());
    }
}
