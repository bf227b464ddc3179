//! A single separation job

use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use super::layout::JobLayout;
use crate::planner::SourceSpan;
use crate::stems::{ModelType, StemSelection};

/// Stage text reported by jobs that have not been dispatched yet
pub const WAITING_STAGE: &str = "Waiting...";

/// Position of a job inside its batch (1-based, planner order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub usize);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{:02}", self.0)
    }
}

/// Job lifecycle
///
/// Status only moves forward: `Pending → Running → {Done | Failed}`.
/// `Pending → Failed` is allowed when a batch is aborted before the job was
/// dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Done | Self::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// True if moving from `self` to `next` goes forward
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

/// One rendered span plus everything the worker needs to process it
///
/// Everything except status, percent and stage is fixed at creation.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    label: String,
    span: SourceSpan,
    layout: JobLayout,
    stems: StemSelection,
    chunk_size: u32,
    status: JobStatus,
    percent: u8,
    stage: String,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    failure: Option<String>,
}

impl Job {
    pub fn new(
        id: JobId,
        label: impl Into<String>,
        span: SourceSpan,
        layout: JobLayout,
        stems: StemSelection,
        chunk_size: u32,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            span,
            layout,
            stems,
            chunk_size,
            status: JobStatus::Pending,
            percent: 0,
            stage: WAITING_STAGE.to_string(),
            started_at: None,
            finished_at: None,
            failure: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Human-readable name (the source track's name)
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn span(&self) -> &SourceSpan {
        &self.span
    }

    pub fn layout(&self) -> &JobLayout {
        &self.layout
    }

    pub fn input_file(&self) -> &Path {
        &self.layout.input
    }

    pub fn output_dir(&self) -> &Path {
        &self.layout.output_dir
    }

    pub fn model(&self) -> ModelType {
        self.stems.model()
    }

    /// Stems frozen at creation time
    pub fn stems(&self) -> &StemSelection {
        &self.stems
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Reason the job failed, if it did
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Time spent running, up to `now` or to completion
    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.started_at {
            Some(start) => self.finished_at.unwrap_or(now).saturating_duration_since(start),
            None => Duration::ZERO,
        }
    }

    fn advance(&mut self, next: JobStatus) -> bool {
        if !self.status.can_advance_to(next) {
            log::warn!(
                "Job {}: Ignoring backward transition {} -> {}",
                self.id,
                self.status,
                next
            );
            return false;
        }
        log::debug!("Job {}: {} -> {}", self.id, self.status, next);
        self.status = next;
        true
    }

    pub(crate) fn mark_running(&mut self, now: Instant) {
        if self.advance(JobStatus::Running) {
            self.started_at = Some(now);
            self.stage = "Starting".to_string();
        }
    }

    /// Record a progress line; ignored unless the job is running
    pub(crate) fn record_progress(&mut self, percent: u8, stage: &str) {
        if self.status == JobStatus::Running {
            self.percent = percent.min(100);
            self.stage = stage.to_string();
        }
    }

    pub(crate) fn mark_done(&mut self, now: Instant) {
        if self.advance(JobStatus::Done) {
            self.finished_at = Some(now);
            self.percent = 100;
            self.stage = "Complete".to_string();
        }
    }

    pub(crate) fn mark_failed(&mut self, now: Instant, reason: impl Into<String>) {
        if self.advance(JobStatus::Failed) {
            self.finished_at = Some(now);
            let reason = reason.into();
            self.stage = reason.clone();
            self.failure = Some(reason);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::stems::StemSettings;
    use crate::types::{ItemId, TrackId};

    pub(crate) fn test_job(dir: &Path, index: usize) -> Job {
        let id = JobId(index);
        let span = SourceSpan {
            track: TrackId(index as u64),
            items: vec![ItemId(100 + index as u64)],
            start: 0.0,
            duration: 4.0,
            time_range: None,
        };
        Job::new(
            id,
            format!("Track {}", index),
            span,
            JobLayout::new(dir, id),
            StemSettings::default().snapshot(ModelType::HtDemucs),
            40,
        )
    }

    #[test]
    fn test_new_job_is_waiting() {
        let job = test_job(Path::new("/tmp"), 1);
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.percent(), 0);
        assert_eq!(job.stage(), WAITING_STAGE);
        assert_eq!(job.id().to_string(), "job-01");
    }

    #[test]
    fn test_status_only_moves_forward() {
        let now = Instant::now();
        let mut job = test_job(Path::new("/tmp"), 1);
        job.mark_running(now);
        job.record_progress(40, "Processing");
        job.mark_done(now);
        assert_eq!(job.status(), JobStatus::Done);
        assert_eq!(job.percent(), 100);

        job.mark_running(now);
        job.mark_failed(now, "late failure");
        job.record_progress(10, "stale");
        assert_eq!(job.status(), JobStatus::Done);
        assert_eq!(job.percent(), 100);
        assert_eq!(job.failure(), None);
    }

    #[test]
    fn test_progress_ignored_before_dispatch() {
        let mut job = test_job(Path::new("/tmp"), 1);
        job.record_progress(50, "Processing");
        assert_eq!(job.percent(), 0);
        assert_eq!(job.stage(), WAITING_STAGE);
    }

    #[test]
    fn test_pending_job_can_fail() {
        let mut job = test_job(Path::new("/tmp"), 2);
        job.mark_failed(Instant::now(), "Timed out");
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.failure(), Some("Timed out"));
    }
}
