//! Batch of jobs created from one user action

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::job::{Job, JobId, JobStatus};

/// How the jobs of a batch are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Every job starts immediately
    Parallel,
    /// One job at a time, in planner order
    #[default]
    Sequential,
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parallel => "parallel",
            Self::Sequential => "sequential",
        })
    }
}

/// Worker chunk sizes per scheduling mode
///
/// Parallel workers share the machine, so each gets a smaller chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkProfile {
    pub sequential_chunk_size: u32,
    pub parallel_ratio: f32,
}

impl Default for ChunkProfile {
    fn default() -> Self {
        Self {
            sequential_chunk_size: 40,
            parallel_ratio: 0.6,
        }
    }
}

impl ChunkProfile {
    pub fn chunk_size_for(&self, mode: BatchMode) -> u32 {
        match mode {
            BatchMode::Sequential => self.sequential_chunk_size,
            BatchMode::Parallel => {
                ((self.sequential_chunk_size as f32 * self.parallel_ratio).round() as u32).max(1)
            }
        }
    }
}

/// Aggregate batch state derived from its jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// At least one job is pending or running and none failed
    InProgress,
    /// Every job is done
    Done,
    /// At least one job failed
    Failed,
}

/// Jobs created together and reconciled together
#[derive(Debug)]
pub struct Batch {
    id: String,
    dir: PathBuf,
    jobs: Vec<Job>,
    mode: BatchMode,
    started_at: Option<Instant>,
}

impl Batch {
    pub fn new(id: impl Into<String>, dir: PathBuf, jobs: Vec<Job>, mode: BatchMode) -> Self {
        Self {
            id: id.into(),
            dir,
            jobs,
            mode,
            started_at: None,
        }
    }

    /// Timestamp-based batch identifier, also the batch directory name
    pub fn generate_id() -> String {
        chrono::Local::now().format("%Y%m%d-%H%M%S-%3f").to_string()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn mode(&self) -> BatchMode {
        self.mode
    }

    /// Jobs in planner order
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub(crate) fn jobs_mut(&mut self) -> &mut [Job] {
        &mut self.jobs
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id() == id)
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub(crate) fn mark_started(&mut self, now: Instant) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    /// Time since the first dispatch
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.started_at
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status() == status).count()
    }

    pub fn status(&self) -> BatchStatus {
        if self.count(JobStatus::Failed) > 0 {
            BatchStatus::Failed
        } else if self.is_done() {
            BatchStatus::Done
        } else {
            BatchStatus::InProgress
        }
    }

    /// True iff every job is done
    pub fn is_done(&self) -> bool {
        self.jobs.iter().all(|j| j.status() == JobStatus::Done)
    }

    /// Ids of jobs that have not reached a terminal status
    pub fn unfinished(&self) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter(|j| !j.status().is_terminal())
            .map(|j| j.id())
            .collect()
    }
}
