//! The bounded-concurrency scheduler (C3).
//!
//! Ported from `cljob/rsh.py::_run_rsh_jobs`'s cooperative poll loop, per the
//! "Cooperative poll loop → native primitives" design note: each admitted
//! job runs its blocking wait on a dedicated worker thread that reports
//! completion over an `mpsc` channel, and a single `Instant` deadline
//! replaces recomputing elapsed wall-clock time every sweep. The external
//! contract — admission cap, batch-timeout kill-all, lazy completion-order
//! emission — is unchanged.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::exec::JobRunner;
use crate::job::Job;

/// Hard cap on simultaneously running children, independent of
/// `max_in_flight`. `Child::wait_with_output` drains pipes per job; well
/// beyond this many concurrent children risks exhausting typical OS
/// descriptor limits (see spec.md §4.2).
pub const MAX_IN_FLIGHT_CAP: usize = 510;

/// Knobs for [`Supervisor::run`].
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// Wall-clock budget for the entire batch. `Duration::ZERO` means
    /// unbounded.
    pub timeout: Duration,
    /// Retained for API parity with the poll-loop design this supervisor
    /// replaces; the channel-based implementation blocks on the next
    /// completion or the timeout deadline directly rather than sleeping in
    /// fixed increments, so this value no longer gates responsiveness.
    pub poll_interval: Duration,
    /// Cap on simultaneously running children. Zero means "use the number
    /// of submitted jobs". Always clamped to [`MAX_IN_FLIGHT_CAP`].
    pub max_in_flight: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            timeout: Duration::ZERO,
            poll_interval: Duration::from_millis(100),
            max_in_flight: 0,
        }
    }
}

enum Event {
    Done { token: u64, job: Job },
}

struct RunningInfo {
    pid: Option<u32>,
    /// Clone of the job at admission time (all result fields unset), kept
    /// so a timeout escalation can emit a completed job without waiting on
    /// the worker thread.
    stub: Job,
}

/// Lazily-emitting iterator over completed jobs, returned by
/// [`Supervisor::run`]. Implements spec.md §4.2's state machine.
pub struct CompletedJobs {
    pending: Vec<Job>,
    running: HashMap<u64, RunningInfo>,
    next_token: u64,
    max_in_flight: usize,
    deadline: Option<Instant>,
    ready: VecDeque<Job>,
    timed_out_batch_done: bool,
    rx: Receiver<Event>,
    tx: Sender<Event>,
    runner: Arc<dyn JobRunner>,
}

impl CompletedJobs {
    fn refill(&mut self) {
        while self.running.len() < self.max_in_flight && !self.pending.is_empty() {
            let job = self.pending.pop().expect("checked non-empty");
            let token = self.next_token;
            self.next_token += 1;
            let stub = job.clone();

            match self.runner.start(&job) {
                Ok(mut child) => {
                    let pid = child.id();
                    debug!(host = %job.host, pid, "job started");
                    self.running.insert(token, RunningInfo { pid: Some(pid), stub });

                    let tx = self.tx.clone();
                    let runner = Arc::clone(&self.runner);
                    let mut job = job;
                    std::thread::spawn(move || {
                        match child.wait_with_output() {
                            Ok(output) => runner.finalize(&mut job, output),
                            Err(e) => {
                                job.exception = Some(crate::exec::spawn_exception(&e));
                            }
                        }
                        let _ = tx.send(Event::Done { token, job });
                    });
                }
                Err(e) => {
                    let mut job = job;
                    job.exception = Some(crate::exec::spawn_exception(&e));
                    warn!(host = %job.host, error = %e, "job failed to start");
                    self.ready.push_back(job);
                }
            }
        }
    }

    /// Terminate every still-running job via two-step signal escalation and
    /// buffer each as a timed-out completion. Drops any jobs still in
    /// `pending` without emission, per spec.md §8 boundary behaviors.
    fn fire_timeout(&mut self) {
        info!(running = self.running.len(), "batch timeout reached");
        let mut tokens: Vec<u64> = self.running.keys().copied().collect();
        tokens.sort_unstable();
        for token in tokens {
            let info = self.running.remove(&token).expect("token present");
            let mut stub = info.stub;
            stub.timed_out = true;
            if let Some(pid) = info.pid
                && let Some(ex) = terminate_job(pid)
            {
                stub.exception = Some(ex);
            }
            self.ready.push_back(stub);
        }
        self.pending.clear();
        self.timed_out_batch_done = true;
    }
}

impl Iterator for CompletedJobs {
    type Item = Job;

    fn next(&mut self) -> Option<Job> {
        loop {
            if let Some(job) = self.ready.pop_front() {
                return Some(job);
            }

            if self.timed_out_batch_done {
                return None;
            }

            self.refill();
            if let Some(job) = self.ready.pop_front() {
                return Some(job);
            }

            if self.running.is_empty() && self.pending.is_empty() {
                return None;
            }

            match self.deadline {
                None => {
                    // No batch timeout: block indefinitely for the next
                    // completion. `running` is non-empty here, so some
                    // worker thread will eventually send.
                    match self.rx.recv() {
                        Ok(Event::Done { token, job }) => {
                            if self.running.remove(&token).is_some() {
                                self.ready.push_back(job);
                            }
                        }
                        Err(_) => return None,
                    }
                }
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        self.fire_timeout();
                        continue;
                    }
                    match self.rx.recv_timeout(dl - now) {
                        Ok(Event::Done { token, job }) => {
                            if self.running.remove(&token).is_some() {
                                self.ready.push_back(job);
                            }
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            self.fire_timeout();
                        }
                        Err(mpsc::RecvTimeoutError::Disconnected) => return None,
                    }
                }
            }
        }
    }
}

/// Attempt graceful termination first, then forceful kill. Returns `Some`
/// only if both signals failed for a reason other than "no such process".
/// Ported from `cljob/rsh.py::_run_rsh_jobs.terminate_job`.
#[cfg(unix)]
fn terminate_job(pid: u32) -> Option<crate::job::JobException> {
    if send_signal(pid, libc::SIGTERM).is_ok() {
        return None;
    }
    match send_signal(pid, libc::SIGKILL) {
        Ok(()) => None,
        Err(e) => Some(
            crate::job::JobException::new("io::Error", format!("SIGKILL failed: {e}"))
                .with_trace(format!("SIGTERM failed, then SIGKILL failed: {e}")),
        ),
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: libc::c_int) -> std::io::Result<()> {
    // SAFETY: kill(2) is safe to call with any pid and a valid signal number.
    let ret = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if ret == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        // Already gone — treat as a successful termination.
        return Ok(());
    }
    Err(err)
}

#[cfg(not(unix))]
fn terminate_job(_pid: u32) -> Option<crate::job::JobException> {
    Some(crate::job::JobException::new(
        "UnsupportedPlatform",
        "signal delivery is only implemented on unix",
    ))
}

/// Public entry point for the supervisor (C3).
pub struct Supervisor;

impl Supervisor {
    /// Drive `jobs` through a fixed-size in-flight set, returning a lazy
    /// stream of completed jobs. See spec.md §4.2 for the full contract.
    pub fn run(jobs: Vec<Job>, runner: Arc<dyn JobRunner>, config: SupervisorConfig) -> CompletedJobs {
        let max_in_flight = if config.max_in_flight == 0 {
            jobs.len()
        } else {
            config.max_in_flight
        }
        .min(MAX_IN_FLIGHT_CAP);

        let deadline = if config.timeout == Duration::ZERO {
            None
        } else {
            Some(Instant::now() + config.timeout)
        };

        let (tx, rx) = mpsc::channel();

        CompletedJobs {
            pending: jobs,
            running: HashMap::new(),
            next_token: 0,
            max_in_flight,
            deadline,
            ready: VecDeque::new(),
            timed_out_batch_done: false,
            rx,
            tx,
            runner,
        }
    }
}
