//! End-to-end separation
//!
//! Prepare → run → resolve → reconcile, for callers that do not need to
//! drive the tick loop themselves.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::jobs::{prepare_batch, BatchRequest};
use crate::orchestrator::{run_until_finished, CancelToken, Orchestrator, TickOutcome};
use crate::progress::BatchProgress;
use crate::reconcile::{reconcile, OutputMode, ReconciliationPlan, ReconciliationSummary};
use crate::render::Renderer;
use crate::timeline::TimelineHost;
use crate::worker::WorkerLauncher;

/// How a separation runs once its batch is prepared
#[derive(Debug, Clone)]
pub struct SeparationOptions {
    pub output: OutputMode,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub media_dir: Option<PathBuf>,
}

/// How a separation ended
#[derive(Debug)]
pub enum SeparationOutcome {
    Completed(ReconciliationSummary),
    /// Cancelled before completion; the timeline was not touched
    Cancelled,
}

/// Run a complete separation against `host`
///
/// The timeline is only edited after every job is done. Cancelling through
/// `cancel` stops the run at the next tick without reconciling.
pub fn run_separation<H, R, L, F>(
    host: &mut H,
    renderer: &R,
    launcher: L,
    request: &BatchRequest<'_>,
    options: &SeparationOptions,
    cancel: CancelToken,
    on_progress: F,
) -> Result<SeparationOutcome>
where
    H: TimelineHost + ?Sized,
    R: Renderer + ?Sized,
    L: WorkerLauncher,
    F: FnMut(&BatchProgress),
{
    let batch = prepare_batch(&*host, renderer, request)?;
    log::info!(
        "run_separation: Batch {} prepared with {} job(s)",
        batch.id(),
        batch.jobs().len()
    );

    let mut orchestrator =
        Orchestrator::new(batch, launcher, options.timeout).with_cancel_token(cancel);
    match run_until_finished(&mut orchestrator, options.poll_interval, on_progress)? {
        TickOutcome::Completed(_) => {}
        TickOutcome::Cancelled | TickOutcome::InProgress(_) => {
            log::info!(
                "run_separation: Cancelled, job files left in {:?}",
                orchestrator.batch().dir()
            );
            return Ok(SeparationOutcome::Cancelled);
        }
    }

    let batch = orchestrator.into_batch();
    let plan = ReconciliationPlan::resolve(&batch, options.output, options.media_dir.as_deref())?;
    let summary = reconcile(host, plan)?;
    Ok(SeparationOutcome::Completed(summary))
}
