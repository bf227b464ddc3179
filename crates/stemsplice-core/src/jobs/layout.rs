//! On-disk layout of a job directory
//!
//! ```text
//! <batch dir>/job-01/
//!   input.wav   rendered span (worker input)
//!   stdout      worker progress lines (PROGRESS:<pct>:<stage>)
//!   log         worker diagnostics (stderr)
//!   done        terminal marker, written once the worker stopped
//!   stems/      worker output directory (<stemKey>.<ext>)
//! ```

use std::io;
use std::path::{Path, PathBuf};

use super::job::JobId;

/// Paths of one job's files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLayout {
    pub dir: PathBuf,
    pub input: PathBuf,
    pub progress: PathBuf,
    pub log: PathBuf,
    pub done_marker: PathBuf,
    pub output_dir: PathBuf,
}

impl JobLayout {
    pub fn new(batch_dir: &Path, id: JobId) -> Self {
        let dir = batch_dir.join(id.to_string());
        Self {
            input: dir.join("input.wav"),
            progress: dir.join("stdout"),
            log: dir.join("log"),
            done_marker: dir.join("done"),
            output_dir: dir.join("stems"),
            dir,
        }
    }

    /// Create the job and output directories
    pub fn create(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.output_dir)
    }

    /// True once the terminal marker exists
    pub fn is_marked_done(&self) -> bool {
        self.done_marker.exists()
    }
}
