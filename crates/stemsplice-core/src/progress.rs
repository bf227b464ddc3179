//! Progress poller
//!
//! Workers append `PROGRESS:<0-100>:<stage>` lines to their stdout file. The
//! poller re-reads the whole file on every tick and keeps the last
//! well-formed line; anything else (tracebacks, partial writes, library
//! chatter) is ignored.

use std::io;
use std::path::Path;
use std::time::Duration;

use crate::jobs::{Batch, JobId, JobStatus};

const PROGRESS_PREFIX: &str = "PROGRESS:";

/// One parsed progress line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLine {
    pub percent: u8,
    pub stage: String,
}

/// Parse a single `PROGRESS:<pct>:<stage>` line
///
/// The percentage must be an integer in 0..=100. The stage may be empty and
/// may itself contain colons.
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let rest = line.trim_end_matches(['\r', '\n']).strip_prefix(PROGRESS_PREFIX)?;
    let (percent, stage) = rest.split_once(':')?;
    let percent = percent.trim();
    // Plain decimal digits only: no sign, no fraction
    if percent.is_empty() || !percent.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let percent: u8 = percent.parse().ok()?;
    if percent > 100 {
        return None;
    }
    Some(ProgressLine {
        percent,
        stage: stage.trim().to_string(),
    })
}

/// Read the last well-formed progress line from a worker's stdout file
///
/// A file that does not exist yet is not an error.
pub fn read_latest_progress(path: &Path) -> io::Result<Option<ProgressLine>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .rev()
        .find_map(parse_progress_line))
}

/// Progress of one job at one tick
#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    pub id: JobId,
    pub label: String,
    pub status: JobStatus,
    pub percent: u8,
    pub stage: String,
    pub elapsed: Duration,
}

/// Progress of a whole batch at one tick
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    /// floor(mean of job percentages)
    pub percent: u8,
    /// Per-job progress in planner order
    pub jobs: Vec<JobProgress>,
    pub elapsed: Duration,
    pub running: usize,
    pub done: usize,
}

impl BatchProgress {
    /// Snapshot the batch as seen at `now`
    pub fn snapshot(batch: &Batch, now: std::time::Instant) -> Self {
        let jobs: Vec<JobProgress> = batch
            .jobs()
            .iter()
            .map(|job| JobProgress {
                id: job.id(),
                label: job.label().to_string(),
                status: job.status(),
                percent: job.percent(),
                stage: job.stage().to_string(),
                elapsed: job.elapsed(now),
            })
            .collect();
        Self {
            percent: aggregate(jobs.iter().map(|j| j.percent)),
            running: batch.count(JobStatus::Running),
            done: batch.count(JobStatus::Done),
            elapsed: batch.elapsed(now),
            jobs,
        }
    }

    /// One-line summary, e.g. `45% (1 running, 2/4 done)`
    pub fn summary(&self) -> String {
        format!(
            "{}% ({} running, {}/{} done)",
            self.percent,
            self.running,
            self.done,
            self.jobs.len()
        )
    }
}

/// floor(mean) of job percentages; 0 for an empty batch
pub fn aggregate(percents: impl IntoIterator<Item = u8>) -> u8 {
    let (sum, count) = percents
        .into_iter()
        .fold((0u32, 0u32), |(sum, n), p| (sum + p as u32, n + 1));
    if count == 0 {
        0
    } else {
        (sum / count) as u8
    }
}
