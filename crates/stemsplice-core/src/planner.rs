//! Extraction planner
//!
//! Turns the user's selection into an ordered list of [`SourceSpan`]s, one
//! per track, in track display order. Each span remembers exactly which
//! items it was drawn from so the reconciler only ever touches the material
//! that was separated.
//!
//! ```text
//!   time range  ──────[==========]──────────
//!   track 1     ──[item 3]───[item 4]───────   → span(track 1, items 3+4)
//!   track 2     ─────────[item 7]───────────   → span(track 2, item 7)
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timeline::TimelineHost;
use crate::types::{ItemId, TimeRange, TrackId};

/// Why a selection produced no audio to separate
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionError {
    #[error("No audio in selection: no items or tracks are selected")]
    NoTracksSelected,

    #[error("No audio in selection: no selected item overlaps the time range")]
    NoItemsOverlapRange,

    #[error("No audio in selection: the selected tracks have no items")]
    SelectedTracksEmpty,
}

/// The user's current selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Active time range, if any
    pub time_range: Option<TimeRange>,
    /// Explicitly selected items
    pub items: Vec<ItemId>,
    /// Selected tracks (used when no items are selected)
    pub tracks: Vec<TrackId>,
}

impl Selection {
    pub fn items(items: impl IntoIterator<Item = ItemId>) -> Self {
        Self {
            items: items.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn tracks(tracks: impl IntoIterator<Item = TrackId>) -> Self {
        Self {
            tracks: tracks.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }
}

/// A portion of one track that becomes one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub track: TrackId,
    /// Items the audio was drawn from, ordered by position
    pub items: Vec<ItemId>,
    /// Timeline start (seconds)
    pub start: f64,
    /// Length (seconds), always > 0
    pub duration: f64,
    /// Time range the span was cut from, if one was active
    pub time_range: Option<TimeRange>,
}

impl SourceSpan {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn extent(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            end: self.end(),
        }
    }
}

/// Compute the spans to extract for `selection`
///
/// Candidate items are the selected items, or every item on the selected
/// tracks when no item is selected. With a time range only candidates that
/// overlap it are kept and each span is clamped to the range.
pub fn plan_spans<H>(host: &H, selection: &Selection) -> Result<Vec<SourceSpan>, SelectionError>
where
    H: TimelineHost + ?Sized,
{
    let mut candidates: Vec<ItemId> = selection
        .items
        .iter()
        .copied()
        .filter(|id| match host.item(*id) {
            Some(item) => item.length > 0.0,
            None => {
                log::warn!("plan_spans: Ignoring unknown selected item {}", id);
                false
            }
        })
        .collect();

    if candidates.is_empty() {
        let tracks: Vec<TrackId> = selection
            .tracks
            .iter()
            .copied()
            .filter(|t| host.track(*t).is_some())
            .collect();
        if tracks.is_empty() {
            return Err(SelectionError::NoTracksSelected);
        }
        candidates = tracks
            .iter()
            .flat_map(|t| host.items_on_track(*t))
            .filter(|id| host.item(*id).is_some_and(|i| i.length > 0.0))
            .collect();
        if candidates.is_empty() {
            return Err(SelectionError::SelectedTracksEmpty);
        }
    }

    if let Some(range) = selection.time_range {
        candidates.retain(|id| {
            host.item(*id)
                .is_some_and(|item| range.overlaps(item.position, item.end()))
        });
        if candidates.is_empty() {
            return Err(SelectionError::NoItemsOverlapRange);
        }
    }

    let mut spans = Vec::new();
    for track in host.track_ids() {
        let items: Vec<ItemId> = host
            .items_on_track(track)
            .into_iter()
            .filter(|id| candidates.contains(id))
            .collect();
        if items.is_empty() {
            continue;
        }

        let (mut start, mut end) = (f64::INFINITY, f64::NEG_INFINITY);
        for item in items.iter().filter_map(|id| host.item(*id)) {
            start = start.min(item.position);
            end = end.max(item.end());
        }
        let extent = match selection.time_range {
            Some(range) => range.intersect(start, end),
            None => TimeRange::new(start, end),
        };
        let Some(extent) = extent else {
            continue;
        };

        log::debug!(
            "plan_spans: {} -> {} item(s), {}",
            track,
            items.len(),
            extent
        );
        spans.push(SourceSpan {
            track,
            items,
            start: extent.start,
            duration: extent.duration(),
            time_range: selection.time_range,
        });
    }

    if spans.is_empty() {
        return Err(match selection.time_range {
            Some(_) => SelectionError::NoItemsOverlapRange,
            None => SelectionError::SelectedTracksEmpty,
        });
    }

    log::info!(
        "plan_spans: {} span(s) from {} item(s)",
        spans.len(),
        spans.iter().map(|s| s.items.len()).sum::<usize>()
    );
    Ok(spans)
}
