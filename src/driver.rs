//! The driver (C6): wires the supervisor's completion stream into a
//! pipeline of aggregators and derives the process exit code.
//!
//! Ported from `cljob/rsh.py`'s top-level `run_*_jobs` functions, which fan
//! each completed job out to every registered `handler.py` aggregator in
//! turn, then call `finish()` on all of them. A `JobStatuses` aggregator is
//! always registered internally so the driver can answer "was the whole
//! batch clean?" without requiring a caller to supply one.

use std::sync::Arc;

use tracing::warn;

use crate::aggregate::Aggregator;
use crate::aggregators::JobStatuses;
use crate::exec::JobRunner;
use crate::job::Job;
use crate::supervisor::{Supervisor, SupervisorConfig};

/// Result of driving one batch: whether every job was clean, and the
/// per-category tally used to build the exit code / final log line.
pub struct DriveOutcome {
    pub all_ok: bool,
    pub total: usize,
}

/// Drain `jobs` through the supervisor, fanning each completion out to every
/// aggregator in `aggregators` (registration order), then flushing each of
/// them in the same order.
///
/// Aggregator I/O failures are logged and swallowed — per spec.md §7 point
/// 5, one aggregator's flush failure must not stop the others from running
/// or change the computed exit code.
pub fn drive(
    jobs: Vec<Job>,
    runner: Arc<dyn JobRunner>,
    config: SupervisorConfig,
    mut aggregators: Vec<Box<dyn Aggregator>>,
) -> DriveOutcome {
    let mut statuses = JobStatuses::new();

    for job in Supervisor::run(jobs, runner, config) {
        statuses.consume(&job);
        for agg in aggregators.iter_mut() {
            agg.consume(&job);
        }
    }

    for agg in aggregators.iter_mut() {
        if let Err(e) = agg.flush() {
            warn!(error = %e, "aggregator flush failed");
        }
    }

    DriveOutcome {
        all_ok: statuses.all_ok(),
        total: statuses.total(),
    }
}
