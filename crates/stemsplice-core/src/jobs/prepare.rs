//! Batch preparation
//!
//! Selection → spans → rendered input files → jobs. Nothing here touches the
//! timeline; a failure at any step leaves no batch behind.

use std::path::{Path, PathBuf};
use thiserror::Error;

use super::batch::{Batch, BatchMode, ChunkProfile};
use super::job::{Job, JobId};
use super::layout::JobLayout;
use crate::planner::{plan_spans, Selection, SelectionError};
use crate::render::{render_all, RenderError, RenderRequest, Renderer};
use crate::stems::{ModelType, StemSettings};
use crate::timeline::TimelineHost;

/// Errors that abort batch preparation before any job exists
#[derive(Error, Debug)]
pub enum PrepareError {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("No stems selected that {model} can produce")]
    NoStemsSelected { model: ModelType },

    #[error("Failed to create job directory {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Inputs for [`prepare_batch`]
#[derive(Debug, Clone)]
pub struct BatchRequest<'a> {
    pub selection: Selection,
    pub mode: BatchMode,
    pub stems: &'a StemSettings,
    pub model: ModelType,
    pub chunk: ChunkProfile,
    /// Root directory; the batch gets its own subdirectory
    pub work_dir: PathBuf,
}

/// Plan, render and create the jobs of a new batch
///
/// Jobs are numbered from 1 in planner order. Each job receives its own
/// snapshot of the stem selection.
pub fn prepare_batch<H, R>(
    host: &H,
    renderer: &R,
    request: &BatchRequest<'_>,
) -> Result<Batch, PrepareError>
where
    H: TimelineHost + ?Sized,
    R: Renderer + ?Sized,
{
    let spans = plan_spans(host, &request.selection)?;

    let selection = request.stems.snapshot(request.model);
    if selection.is_empty() {
        return Err(PrepareError::NoStemsSelected {
            model: request.model,
        });
    }

    let batch_id = Batch::generate_id();
    let batch_dir = request.work_dir.join(&batch_id);
    log::info!(
        "prepare_batch: {} span(s), model {}, stems [{}], mode {} -> {:?}",
        spans.len(),
        request.model,
        selection.names().join(", "),
        request.mode,
        batch_dir
    );

    let layouts: Vec<JobLayout> = (1..=spans.len())
        .map(|n| JobLayout::new(&batch_dir, JobId(n)))
        .collect();
    for layout in &layouts {
        layout.create().map_err(|source| PrepareError::Io {
            path: layout.dir.clone(),
            source,
        })?;
    }

    let requests: Vec<RenderRequest> = spans
        .iter()
        .zip(&layouts)
        .map(|(span, layout)| RenderRequest::from_span(host, span, layout.input.clone()))
        .collect();

    if let Err(e) = render_all(renderer, &requests) {
        log::error!("prepare_batch: Rendering failed: {}", e);
        discard_batch_dir(&batch_dir);
        return Err(e.into());
    }

    let chunk_size = request.chunk.chunk_size_for(request.mode);
    let jobs = spans
        .into_iter()
        .zip(layouts)
        .enumerate()
        .map(|(i, (span, layout))| {
            let label = host
                .track(span.track)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| span.track.to_string());
            Job::new(JobId(i + 1), label, span, layout, selection.clone(), chunk_size)
        })
        .collect();

    Ok(Batch::new(batch_id, batch_dir, jobs, request.mode))
}

fn discard_batch_dir(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        log::warn!("discard_batch_dir: Could not remove {:?}: {}", dir, e);
    }
}
