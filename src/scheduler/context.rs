//! Per-run shared state.
//!
//! A [`RunContext`] is created at run start, owned by the scheduler, and
//! handed to every dispatched task. It replaces process-global mutable
//! state: counters live under a single lock scoped to increments, the
//! per-machinery pending-fault flags are atomics whose read-then-clear is a
//! single `swap`, and the stop signal is a shared flag checked once per tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Process-wide counters for one simulation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    /// Values written for non-fault samples (one per head for multi-head).
    pub samples_generated: u64,
    /// Values written for fault samples.
    pub faults_generated: u64,
}

/// Shared state for one simulation run.
pub struct RunContext {
    counters: Mutex<RunCounters>,
    fault_flags: HashMap<String, AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl RunContext {
    /// Creates the context for a run over the given machineries.
    #[must_use]
    pub fn new<'a>(machinery_uids: impl IntoIterator<Item = &'a str>, stop: Arc<AtomicBool>) -> Self {
        let fault_flags = machinery_uids
            .into_iter()
            .map(|uid| (uid.to_string(), AtomicBool::new(false)))
            .collect();
        Self {
            counters: Mutex::new(RunCounters::default()),
            fault_flags,
            stop,
        }
    }

    /// Adds to the non-fault counter.
    pub fn add_samples(&self, count: u64) {
        if let Ok(mut counters) = self.counters.lock() {
            counters.samples_generated += count;
        }
    }

    /// Adds to the fault counter.
    pub fn add_faults(&self, count: u64) {
        if let Ok(mut counters) = self.counters.lock() {
            counters.faults_generated += count;
        }
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn counters(&self) -> RunCounters {
        self.counters.lock().map(|c| *c).unwrap_or_default()
    }

    /// Arms the pending-fault flag for a machinery.
    pub fn arm_fault(&self, machinery_uid: &str) {
        if let Some(flag) = self.fault_flags.get(machinery_uid) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    /// Consumes the pending-fault flag for a machinery.
    ///
    /// The read-then-clear is a single atomic swap, so at most one caller
    /// observes `true` per armed fault.
    #[must_use]
    pub fn take_fault(&self, machinery_uid: &str) -> bool {
        self.fault_flags
            .get(machinery_uid)
            .is_some_and(|flag| flag.swap(false, Ordering::SeqCst))
    }

    /// Returns true if a fault is pending for the machinery.
    #[must_use]
    pub fn fault_pending(&self, machinery_uid: &str) -> bool {
        self.fault_flags
            .get(machinery_uid)
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Returns true once a stop has been requested.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}
