//! Top-level error type
//!
//! Each concern has its own error enum; [`StemspliceError`] gathers the
//! ones that abort a separation and maps each to one actionable message.

use thiserror::Error;

use crate::jobs::PrepareError;
use crate::orchestrator::OrchestratorError;
use crate::planner::SelectionError;
use crate::reconcile::ReconciliationError;
use crate::render::RenderError;

/// Errors that abort a separation
#[derive(Error, Debug)]
pub enum StemspliceError {
    #[error(transparent)]
    Prepare(#[from] PrepareError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),
}

pub type Result<T> = std::result::Result<T, StemspliceError>;

impl From<SelectionError> for StemspliceError {
    fn from(e: SelectionError) -> Self {
        Self::Prepare(PrepareError::Selection(e))
    }
}

impl From<RenderError> for StemspliceError {
    fn from(e: RenderError) -> Self {
        Self::Prepare(PrepareError::Render(e))
    }
}

/// What the user should do about an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Change the selection or stem choice
    Reselect,
    /// Fix the worker installation
    Reinstall,
    /// Try again, possibly with different settings
    Retry,
}

impl StemspliceError {
    pub fn action(&self) -> ErrorAction {
        match self {
            Self::Prepare(PrepareError::Selection(_))
            | Self::Prepare(PrepareError::NoStemsSelected { .. })
            | Self::Prepare(PrepareError::Render(RenderError::NothingToRender { .. }))
            | Self::Prepare(PrepareError::Render(RenderError::UnsupportedSource { .. })) => {
                ErrorAction::Reselect
            }
            Self::Orchestrator(OrchestratorError::Dispatch { .. })
            | Self::Reconciliation(ReconciliationError::NoStemsFound { .. }) => {
                ErrorAction::Reinstall
            }
            _ => ErrorAction::Retry,
        }
    }

    /// Message for the user, naming what to do next
    pub fn user_message(&self) -> String {
        match self {
            Self::Prepare(PrepareError::Selection(e)) => format!(
                "{}. Select items or tracks (and optionally a time range that overlaps \
                 them), then try again.",
                e
            ),
            Self::Prepare(PrepareError::NoStemsSelected { model }) => format!(
                "None of the selected stems can be produced by {} ({}). \
                 Select other stems or a 6-stem model.",
                model.display_name(),
                model
            ),
            Self::Prepare(PrepareError::Render(e)) => match e {
                RenderError::NothingToRender { .. } => format!(
                    "{}. Unmute the items or select different material.",
                    e
                ),
                RenderError::UnsupportedSource { .. } => format!(
                    "{}. Convert the source to 44.1 kHz WAV or select other material.",
                    e
                ),
                _ => format!(
                    "Rendering the selection failed: {}. Check that the source files \
                     exist and the disk is writable, then retry.",
                    e
                ),
            },
            Self::Prepare(PrepareError::Io { path, .. }) => format!(
                "Could not create the job folder {:?}. \
                 Check permissions and free disk space, then retry.",
                path
            ),
            Self::Orchestrator(OrchestratorError::Dispatch { source, .. }) => format!(
                "{}. Check the worker installation (run `stemsplice check`) \
                 and the worker settings.",
                source
            ),
            Self::Orchestrator(OrchestratorError::Timeout(e)) => format!(
                "{}. Try sequential mode or a shorter selection, \
                 or raise scheduling.timeout_secs, then retry.",
                e
            ),
            Self::Orchestrator(OrchestratorError::Aborted) => {
                "The separation was already aborted. Start a new separation.".to_string()
            }
            Self::Reconciliation(ReconciliationError::NoStemsFound { output_dir, .. }) => format!(
                "The worker finished without producing any stems. \
                 See the log in {:?} and check the worker installation.",
                output_dir.parent().unwrap_or(output_dir)
            ),
            Self::Reconciliation(e) => format!(
                "Applying the stems to the timeline failed: {}. \
                 Undo any partial changes and retry.",
                e
            ),
        }
    }
}
