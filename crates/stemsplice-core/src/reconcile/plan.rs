//! Resolving a finished batch into a reconciliation plan

use std::path::{Path, PathBuf};

use super::stem_files::{import_stem, locate_stem};
use super::{OutputMode, ReconciliationError};
use crate::jobs::{Batch, Job, JobId};
use crate::planner::SourceSpan;
use crate::stems::{StemSelection, StemSpec};

/// A stem file found on disk
#[derive(Debug, Clone, PartialEq)]
pub struct FoundStem {
    pub spec: StemSpec,
    pub path: PathBuf,
}

/// One job's results, ready to apply
#[derive(Debug, Clone)]
pub struct ResolvedJob {
    pub id: JobId,
    pub label: String,
    pub span: SourceSpan,
    /// Stems the job was asked for
    pub requested: StemSelection,
    /// Requested stems that exist on disk, in request order
    pub found: Vec<FoundStem>,
    /// Names of requested stems with no file
    pub missing: Vec<String>,
}

/// A job left out of reconciliation
#[derive(Debug)]
pub struct SkippedJob {
    pub id: JobId,
    pub label: String,
    pub requested: usize,
    pub reason: ReconciliationError,
}

/// Everything [`reconcile`](super::reconcile) needs
#[derive(Debug)]
pub struct ReconciliationPlan {
    pub output: OutputMode,
    /// Jobs with at least one stem, in planner order
    pub jobs: Vec<ResolvedJob>,
    pub skipped: Vec<SkippedJob>,
}

impl ReconciliationPlan {
    /// Locate every job's stems
    ///
    /// With `media_dir` set, found stems are copied there and the copies are
    /// referenced instead of the job directory files.
    pub fn resolve(
        batch: &Batch,
        output: OutputMode,
        media_dir: Option<&Path>,
    ) -> Result<Self, ReconciliationError> {
        if !batch.is_done() {
            let pending = batch
                .jobs()
                .iter()
                .filter(|j| j.status() != crate::jobs::JobStatus::Done)
                .map(|j| j.id())
                .collect();
            return Err(ReconciliationError::BatchNotDone { pending });
        }

        let mut plan = Self {
            output,
            jobs: Vec::new(),
            skipped: Vec::new(),
        };
        for job in batch.jobs() {
            match resolve_job(job, media_dir) {
                Ok(resolved) => plan.jobs.push(resolved),
                Err(reason) => {
                    log::warn!("ReconciliationPlan::resolve: Skipping {}: {}", job.id(), reason);
                    plan.skipped.push(SkippedJob {
                        id: job.id(),
                        label: job.label().to_string(),
                        requested: job.stems().len(),
                        reason,
                    });
                }
            }
        }
        Ok(plan)
    }

    pub fn requested_count(&self) -> usize {
        self.jobs.iter().map(|j| j.requested.len()).sum::<usize>()
            + self.skipped.iter().map(|s| s.requested).sum::<usize>()
    }

    pub fn produced_count(&self) -> usize {
        self.jobs.iter().map(|j| j.found.len()).sum()
    }
}

fn resolve_job(job: &Job, media_dir: Option<&Path>) -> Result<ResolvedJob, ReconciliationError> {
    let mut found = Vec::new();
    let mut missing = Vec::new();
    for spec in job.stems().stems() {
        match locate_stem(job.output_dir(), spec) {
            Some(path) => found.push(FoundStem {
                spec: spec.clone(),
                path,
            }),
            None => missing.push(spec.name.clone()),
        }
    }

    if found.is_empty() {
        return Err(ReconciliationError::NoStemsFound {
            job: job.id(),
            output_dir: job.output_dir().to_path_buf(),
        });
    }
    if !missing.is_empty() {
        log::warn!(
            "resolve_job: {} produced {}/{} stems, missing: {}",
            job.id(),
            found.len(),
            job.stems().len(),
            missing.join(", ")
        );
    }

    if let Some(media_dir) = media_dir {
        for stem in &mut found {
            stem.path = import_stem(&stem.path, media_dir, job.label(), &stem.spec).map_err(
                |source| ReconciliationError::MediaImport {
                    path: stem.path.clone(),
                    source,
                },
            )?;
        }
    }

    Ok(ResolvedJob {
        id: job.id(),
        label: job.label().to_string(),
        span: job.span().clone(),
        requested: job.stems().clone(),
        found,
        missing,
    })
}
