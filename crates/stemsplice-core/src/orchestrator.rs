//! Job orchestrator
//!
//! Drives a [`Batch`] from first dispatch to completion with a cooperative,
//! single-threaded tick loop. Each [`Orchestrator::tick`]:
//!
//! 1. checks the cancel flag,
//! 2. polls every live worker (process exit, progress file, done marker),
//! 3. dispatches pending jobs according to the batch mode,
//! 4. reports completion once every job is done and every worker has exited,
//! 5. enforces the batch timeout.
//!
//! A job that reports 100% is done at once, but its worker handle is kept
//! until the process exits so it gets reaped and its `done` marker written.
//!
//! Nothing here blocks: process checks use `try_wait` and progress files are
//! small reads. Time is passed in by the caller so tests can step through
//! hours of batch time instantly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::jobs::{Batch, BatchMode, JobId, JobStatus};
use crate::progress::{read_latest_progress, BatchProgress};
use crate::worker::{DispatchError, WorkerLauncher, WorkerProcess};

/// Default batch timeout, measured from the first dispatch
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Shared cancel flag, checked once per tick
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The batch did not finish within its time limit
#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "Separation timed out after {}s (limit {}s) with {} job(s) unfinished",
    .elapsed.as_secs(),
    .limit.as_secs(),
    .unfinished.len()
)]
pub struct TimeoutError {
    pub elapsed: Duration,
    pub limit: Duration,
    pub unfinished: Vec<JobId>,
}

/// Errors that abort a batch
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Could not start the separation worker for {job}")]
    Dispatch {
        job: JobId,
        #[source]
        source: DispatchError,
    },

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("Batch was already aborted")]
    Aborted,
}

/// Result of one tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Jobs are still pending or running
    InProgress(BatchProgress),
    /// Every job is done; the batch can be reconciled
    Completed(BatchProgress),
    /// The cancel flag was set; workers were abandoned
    Cancelled,
}

/// Schedules and supervises the jobs of one batch
pub struct Orchestrator<L: WorkerLauncher> {
    batch: Batch,
    launcher: L,
    /// Worker handles, indexed like `batch.jobs()`
    workers: Vec<Option<Box<dyn WorkerProcess>>>,
    timeout: Duration,
    cancel: CancelToken,
    aborted: bool,
}

impl<L: WorkerLauncher> Orchestrator<L> {
    pub fn new(batch: Batch, launcher: L, timeout: Duration) -> Self {
        let workers = batch.jobs().iter().map(|_| None).collect();
        Self {
            batch,
            launcher,
            workers,
            timeout,
            cancel: CancelToken::new(),
            aborted: false,
        }
    }

    /// Use a token created before the orchestrator existed
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this orchestrator from anywhere
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    pub fn into_batch(self) -> Batch {
        self.batch
    }

    /// Start the batch clock and run the first dispatch pass
    ///
    /// Calling `start` again is a no-op.
    pub fn start(&mut self, now: Instant) -> Result<(), OrchestratorError> {
        if self.batch.started_at().is_some() {
            return Ok(());
        }
        log::info!(
            "Orchestrator::start: Batch {} with {} job(s), {} mode, timeout {}s",
            self.batch.id(),
            self.batch.jobs().len(),
            self.batch.mode(),
            self.timeout.as_secs()
        );
        self.batch.mark_started(now);
        self.dispatch(now)
    }

    /// Advance the batch by one step
    pub fn tick(&mut self, now: Instant) -> Result<TickOutcome, OrchestratorError> {
        if self.aborted {
            return Err(OrchestratorError::Aborted);
        }
        if self.cancel.is_cancelled() {
            if self.workers.iter().any(Option::is_some) {
                log::warn!(
                    "Orchestrator::tick: Batch {} cancelled, abandoning running workers",
                    self.batch.id()
                );
                self.workers.iter_mut().for_each(|w| *w = None);
            }
            return Ok(TickOutcome::Cancelled);
        }
        self.start(now)?;

        self.poll_running(now);
        self.dispatch(now)?;

        let draining = self.workers.iter().filter(|w| w.is_some()).count();
        if self.batch.is_done() && draining == 0 {
            let progress = BatchProgress::snapshot(&self.batch, now);
            log::info!(
                "Orchestrator::tick: Batch {} complete after {:.1}s",
                self.batch.id(),
                progress.elapsed.as_secs_f64()
            );
            return Ok(TickOutcome::Completed(progress));
        }

        let elapsed = self.batch.elapsed(now);
        if elapsed >= self.timeout && self.batch.is_done() {
            log::warn!(
                "Orchestrator::tick: Batch {} timed out waiting for {} worker(s) to exit, \
                 terminating them",
                self.batch.id(),
                draining
            );
            self.terminate_workers();
            return Ok(TickOutcome::Completed(BatchProgress::snapshot(&self.batch, now)));
        }
        if elapsed >= self.timeout {
            let unfinished = self.batch.unfinished();
            log::error!(
                "Orchestrator::tick: Batch {} timed out after {}s, unfinished: {:?}",
                self.batch.id(),
                elapsed.as_secs(),
                unfinished
            );
            self.abort(now, "Timed out");
            return Err(TimeoutError {
                elapsed,
                limit: self.timeout,
                unfinished,
            }
            .into());
        }

        if self.batch.is_done() {
            log::debug!("Orchestrator::tick: Waiting for {} worker(s) to exit", draining);
        }
        Ok(TickOutcome::InProgress(BatchProgress::snapshot(&self.batch, now)))
    }

    /// Poll running jobs and draining workers: exit status, progress file,
    /// completion. A handle is dropped only once its process has exited.
    fn poll_running(&mut self, now: Instant) {
        for (job, worker) in self.batch.jobs_mut().iter_mut().zip(&mut self.workers) {
            let running = job.status() == JobStatus::Running;
            if !running && worker.is_none() {
                continue;
            }

            let exited = match worker.as_mut().map(|process| process.poll_exit()) {
                Some(Ok(Some(exit))) => {
                    if !exit.success() {
                        log::warn!(
                            "poll_running: {} worker exited with {:?}, see {:?}",
                            job.id(),
                            exit.code,
                            job.layout().log
                        );
                    }
                    true
                }
                Some(Ok(None)) => false,
                Some(Err(e)) => {
                    log::warn!("poll_running: {} exit check failed: {}", job.id(), e);
                    false
                }
                None => false,
            };
            if exited {
                *worker = None;
            }
            if !running {
                continue;
            }

            match read_latest_progress(&job.layout().progress) {
                Ok(Some(line)) => job.record_progress(line.percent, &line.stage),
                Ok(None) => {}
                Err(e) => log::warn!("poll_running: {} progress unreadable: {}", job.id(), e),
            }

            if job.layout().is_marked_done() || job.percent() >= 100 || exited {
                log::info!(
                    "poll_running: {} ({}) done after {:.1}s",
                    job.id(),
                    job.label(),
                    job.elapsed(now).as_secs_f64()
                );
                job.mark_done(now);
            }
        }
    }

    /// Stop every live worker, leaving job states alone
    fn terminate_workers(&mut self) {
        for (job, worker) in self.batch.jobs().iter().zip(&mut self.workers) {
            if let Some(mut process) = worker.take() {
                if let Err(e) = process.terminate() {
                    log::warn!(
                        "terminate_workers: Could not terminate {} worker: {}",
                        job.id(),
                        e
                    );
                }
            }
        }
    }

    /// Launch pending jobs allowed by the batch mode
    fn dispatch(&mut self, now: Instant) -> Result<(), OrchestratorError> {
        let budget = match self.batch.mode() {
            BatchMode::Parallel => usize::MAX,
            BatchMode::Sequential => {
                usize::from(self.batch.count(JobStatus::Running) == 0)
            }
        };

        let pending: Vec<usize> = self
            .batch
            .jobs()
            .iter()
            .enumerate()
            .filter(|(_, j)| j.status() == JobStatus::Pending)
            .map(|(i, _)| i)
            .take(budget)
            .collect();

        for index in pending {
            let job = &self.batch.jobs()[index];
            match self.launcher.launch(job) {
                Ok(process) => {
                    log::info!("dispatch: Started {} ({})", job.id(), job.label());
                    self.workers[index] = Some(process);
                    self.batch.jobs_mut()[index].mark_running(now);
                }
                Err(source) => {
                    let id = job.id();
                    log::error!("dispatch: Failed to start {}: {}", id, source);
                    self.abort(now, "Worker failed to start");
                    return Err(OrchestratorError::Dispatch { job: id, source });
                }
            }
        }
        Ok(())
    }

    /// Terminate live workers and fail every unfinished job
    fn abort(&mut self, now: Instant, reason: &str) {
        self.aborted = true;
        self.terminate_workers();
        for job in self.batch.jobs_mut() {
            if !job.status().is_terminal() {
                job.mark_failed(now, reason);
            }
        }
    }
}

/// Tick until the batch completes, fails or is cancelled
///
/// `on_progress` is called after every tick. Returns the final outcome
/// ([`TickOutcome::Completed`] or [`TickOutcome::Cancelled`]).
pub fn run_until_finished<L, F>(
    orchestrator: &mut Orchestrator<L>,
    poll_interval: Duration,
    mut on_progress: F,
) -> Result<TickOutcome, OrchestratorError>
where
    L: WorkerLauncher,
    F: FnMut(&BatchProgress),
{
    loop {
        match orchestrator.tick(Instant::now())? {
            TickOutcome::InProgress(progress) => {
                on_progress(&progress);
                std::thread::sleep(poll_interval);
            }
            TickOutcome::Completed(progress) => {
                on_progress(&progress);
                return Ok(TickOutcome::Completed(progress));
            }
            TickOutcome::Cancelled => return Ok(TickOutcome::Cancelled),
        }
    }
}
