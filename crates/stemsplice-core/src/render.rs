//! Renderer adapter
//!
//! Converts a [`SourceSpan`] into a fixed-format audio file the worker can
//! read. The orchestrator only depends on the [`Renderer`] trait; the
//! built-in [`WavRenderer`] mixes the active takes of the span's items into
//! a 44.1 kHz stereo 32-bit float WAV file.
//!
//! Every rendered file is validated before a job is created: a file with no
//! audio frames is a [`RenderError::EmptyOutput`], never an empty job.

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::planner::SourceSpan;
use crate::timeline::TimelineHost;

/// Sample rate of rendered job input files
pub const RENDER_SAMPLE_RATE: u32 = 44100;

/// Channel count of rendered job input files
pub const RENDER_CHANNELS: u16 = 2;

/// Errors that can occur while rendering a span
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Span on {track} has no audible takes to render")]
    NothingToRender { track: crate::types::TrackId },

    #[error("Failed to read source audio: {path}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Unsupported source format {path}: {reason}")]
    UnsupportedSource { path: PathBuf, reason: String },

    #[error("Failed to write rendered audio: {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Renderer produced no output file at {0}")]
    MissingOutput(PathBuf),

    #[error("Renderer produced an empty file (no audio frames): {0}")]
    EmptyOutput(PathBuf),

    #[error("Rendered file is not readable audio: {path}")]
    InvalidOutput {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("IO error while rendering: {0}")]
    Io(#[from] std::io::Error),
}

/// One piece of source audio placed inside the span
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSource {
    pub file: PathBuf,
    /// Timeline position of the item's left edge
    pub position: f64,
    /// Item length on the timeline
    pub length: f64,
    /// Offset into `file` at the item's left edge
    pub source_offset: f64,
}

/// Everything a renderer needs to produce one job input file
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub track: crate::types::TrackId,
    pub start: f64,
    pub duration: f64,
    pub sources: Vec<RenderSource>,
    pub output: PathBuf,
}

impl RenderRequest {
    /// Collect the active, unmuted takes of the span's items
    pub fn from_span<H>(host: &H, span: &SourceSpan, output: PathBuf) -> Self
    where
        H: TimelineHost + ?Sized,
    {
        let sources = span
            .items
            .iter()
            .filter_map(|id| host.item(*id))
            .filter(|item| !item.muted)
            .filter_map(|item| {
                item.active_take().map(|take| RenderSource {
                    file: take.source.clone(),
                    position: item.position,
                    length: item.length,
                    source_offset: take.source_offset,
                })
            })
            .collect();
        Self {
            track: span.track,
            start: span.start,
            duration: span.duration,
            sources,
            output,
        }
    }
}

/// Produces one audio file per request
///
/// Implementations must be synchronous and report failure as an error,
/// never as a silently empty file.
pub trait Renderer: Sync {
    fn render(&self, request: &RenderRequest) -> Result<PathBuf, RenderError>;
}

/// Render every request in parallel, preserving request order
///
/// Each output is validated with [`validate_rendered`]; the first failure
/// aborts the whole set.
pub fn render_all<R>(renderer: &R, requests: &[RenderRequest]) -> Result<Vec<PathBuf>, RenderError>
where
    R: Renderer + ?Sized,
{
    log::info!("render_all: Rendering {} span(s)", requests.len());
    requests
        .par_iter()
        .map(|request| {
            let path = renderer.render(request)?;
            let frames = validate_rendered(&path)?;
            log::debug!(
                "render_all: {:?} ({} frames, {:.2}s)",
                path,
                frames,
                frames as f64 / RENDER_SAMPLE_RATE as f64
            );
            Ok(path)
        })
        .collect()
}

/// Check that a rendered file exists and holds at least one audio frame
///
/// Returns the frame count.
pub fn validate_rendered(path: &Path) -> Result<u32, RenderError> {
    if !path.is_file() {
        return Err(RenderError::MissingOutput(path.to_path_buf()));
    }
    let reader = hound::WavReader::open(path).map_err(|source| RenderError::InvalidOutput {
        path: path.to_path_buf(),
        source,
    })?;
    let frames = reader.duration();
    if frames == 0 {
        return Err(RenderError::EmptyOutput(path.to_path_buf()));
    }
    Ok(frames)
}

/// Built-in renderer for WAV sources
///
/// Sources must already be at [`RENDER_SAMPLE_RATE`]; mono sources are
/// duplicated to both channels and channels beyond the second are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavRenderer;

impl WavRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Read a WAV file as interleaved stereo frames
    fn read_stereo(path: &Path) -> Result<Vec<[f32; 2]>, RenderError> {
        let source_err = |source| RenderError::SourceRead {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = hound::WavReader::open(path).map_err(source_err)?;
        let spec = reader.spec();
        if spec.sample_rate != RENDER_SAMPLE_RATE {
            return Err(RenderError::UnsupportedSource {
                path: path.to_path_buf(),
                reason: format!(
                    "sample rate {} Hz (expected {} Hz)",
                    spec.sample_rate, RENDER_SAMPLE_RATE
                ),
            });
        }
        if spec.channels == 0 {
            return Err(RenderError::UnsupportedSource {
                path: path.to_path_buf(),
                reason: "no channels".to_string(),
            });
        }

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(source_err)?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()
                    .map_err(source_err)?
            }
        };

        let channels = spec.channels as usize;
        Ok(samples
            .chunks_exact(channels)
            .map(|frame| {
                let left = frame[0];
                let right = if channels > 1 { frame[1] } else { frame[0] };
                [left, right]
            })
            .collect())
    }
}

impl Renderer for WavRenderer {
    fn render(&self, request: &RenderRequest) -> Result<PathBuf, RenderError> {
        if request.sources.is_empty() {
            return Err(RenderError::NothingToRender {
                track: request.track,
            });
        }

        let rate = RENDER_SAMPLE_RATE as f64;
        let total_frames = (request.duration * rate).round() as usize;
        let mut mix = vec![[0.0f32; 2]; total_frames];
        let span_end = request.start + request.duration;

        for source in &request.sources {
            let frames = Self::read_stereo(&source.file)?;
            let clip_start = request.start.max(source.position);
            let clip_end = span_end.min(source.position + source.length);
            if clip_end <= clip_start {
                continue;
            }

            let dest_first = ((clip_start - request.start) * rate).round() as usize;
            let src_first =
                ((source.source_offset + (clip_start - source.position)) * rate).round() as usize;
            let count = ((clip_end - clip_start) * rate).round() as usize;

            for i in 0..count {
                let (Some(dest), Some(src)) =
                    (mix.get_mut(dest_first + i), frames.get(src_first + i))
                else {
                    break;
                };
                dest[0] += src[0];
                dest[1] += src[1];
            }
        }

        if let Some(parent) = request.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let spec = hound::WavSpec {
            channels: RENDER_CHANNELS,
            sample_rate: RENDER_SAMPLE_RATE,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let write_err = |source| RenderError::Write {
            path: request.output.clone(),
            source,
        };
        let mut writer = hound::WavWriter::create(&request.output, spec).map_err(write_err)?;
        for frame in &mix {
            writer.write_sample(frame[0]).map_err(write_err)?;
            writer.write_sample(frame[1]).map_err(write_err)?;
        }
        writer.finalize().map_err(write_err)?;

        log::info!(
            "WavRenderer: {} source(s) -> {:?} ({:.2}s)",
            request.sources.len(),
            request.output,
            request.duration
        );
        Ok(request.output.clone())
    }
}
