//! Track, item and take records

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{Color, ItemId, TimeRange, TrackId};

/// One source of audio inside an item
///
/// An item may hold several takes (alternatives for the same region); only
/// the active take is audible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Take {
    /// Display name
    pub name: String,
    /// Audio file backing this take
    pub source: PathBuf,
    /// Offset into the source file (seconds) at the item's left edge
    #[serde(default)]
    pub source_offset: f64,
    /// Take color, if set
    #[serde(default)]
    pub color: Option<Color>,
}

impl Take {
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            source_offset: 0.0,
            color: None,
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }
}

/// A region of audio placed on a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub track: TrackId,
    /// Timeline position of the left edge (seconds)
    pub position: f64,
    /// Length in seconds, always > 0
    pub length: f64,
    #[serde(default)]
    pub muted: bool,
    pub takes: Vec<Take>,
    #[serde(default)]
    pub active_take: usize,
}

impl Item {
    /// Timeline position of the right edge
    pub fn end(&self) -> f64 {
        self.position + self.length
    }

    /// Extent of the item as a range
    pub fn extent(&self) -> Option<TimeRange> {
        TimeRange::new(self.position, self.end())
    }

    /// The audible take, if the item has any
    pub fn active_take(&self) -> Option<&Take> {
        self.takes.get(self.active_take)
    }

    /// Name of the active take, falling back to an empty string
    pub fn display_name(&self) -> &str {
        self.active_take().map(|t| t.name.as_str()).unwrap_or("")
    }
}

/// A track in the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    #[serde(default)]
    pub color: Option<Color>,
    /// Folder track this track is nested under
    #[serde(default)]
    pub parent: Option<TrackId>,
    /// True if other tracks are nested under this one
    #[serde(default)]
    pub is_folder: bool,
}
