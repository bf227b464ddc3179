//! Result reconciliation
//!
//! Once every job of a batch is done, the produced stem files are located
//! ([`ReconciliationPlan::resolve`]) and written back into the timeline
//! ([`reconcile`]) inside a single named edit group, so one undo reverts the
//! whole operation.
//!
//! Per job, in planner order:
//!
//! ```text
//!   disposition of original material   (mute/delete, whole or range)
//!   stems → timeline                    (new tracks, or in-place takes)
//! ```
//!
//! Track deletion is deferred until every job has created its stems.

mod apply;
mod naming;
mod plan;
mod stem_files;
mod summary;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::jobs::JobId;
use crate::timeline::TimelineError;

pub use apply::{isolate_range, reconcile};
pub use naming::{folder_track_name, stem_track_name};
pub use plan::{FoundStem, ReconciliationPlan, ResolvedJob, SkippedJob};
pub use stem_files::{import_stem, locate_stem, sanitize_filename};
pub use summary::ReconciliationSummary;

/// What happens to the original material after separation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Leave the original untouched
    #[default]
    None,
    /// Mute every item the span was drawn from
    MuteAll,
    /// Mute only the part of each item inside the span
    MuteRange,
    /// Delete every item the span was drawn from
    DeleteAll,
    /// Delete only the part of each item inside the span
    DeleteRange,
    /// Delete the source track once all stems exist
    DeleteTrack,
}

impl Disposition {
    pub fn all() -> &'static [Self] {
        &[
            Self::None,
            Self::MuteAll,
            Self::MuteRange,
            Self::DeleteAll,
            Self::DeleteRange,
            Self::DeleteTrack,
        ]
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::MuteAll => "mute_all",
            Self::MuteRange => "mute_range",
            Self::DeleteAll => "delete_all",
            Self::DeleteRange => "delete_range",
            Self::DeleteTrack => "delete_track",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for Disposition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        Self::all()
            .iter()
            .copied()
            .find(|d| d.id().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| format!("Unknown disposition '{}'", s))
    }
}

/// Where the stems go
///
/// `InPlace` carries no disposition: the separated material is replaced by
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// One new track per stem below the source track
    NewTracks {
        create_folder: bool,
        disposition: Disposition,
    },
    /// One multi-take item replacing the separated material
    InPlace,
}

impl OutputMode {
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::NewTracks { disposition, .. } => *disposition,
            Self::InPlace => Disposition::None,
        }
    }
}

/// Errors raised while reconciling
///
/// `NoStemsFound` and `MediaImport` are local to one job: that job is
/// skipped and reported in the summary while the others proceed.
#[derive(Error, Debug)]
pub enum ReconciliationError {
    #[error("Batch is not finished ({} job(s) not done)", .pending.len())]
    BatchNotDone { pending: Vec<JobId> },

    #[error("{job}: worker produced no stem files in {output_dir}")]
    NoStemsFound { job: JobId, output_dir: PathBuf },

    #[error("Failed to copy stem into media folder: {path}")]
    MediaImport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Timeline edit failed")]
    Timeline(#[from] TimelineError),
}
