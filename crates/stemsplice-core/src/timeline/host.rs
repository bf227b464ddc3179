//! The timeline host contract
//!
//! Anything that owns tracks and items (a DAW session, the in-memory
//! [`Timeline`](super::Timeline)) implements [`TimelineHost`] so the
//! planner can read the selection and the reconciler can apply results.

use thiserror::Error;

use super::model::{Item, Take, Track};
use crate::types::{Color, ItemId, TrackId};

/// Errors reported by a timeline host
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimelineError {
    #[error("Unknown track: {0}")]
    UnknownTrack(TrackId),

    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),

    #[error("Cannot split {item} at {at:.3}s: outside the item's interior")]
    SplitOutOfBounds { item: ItemId, at: f64 },

    #[error("Invalid item length {length} (must be > 0)")]
    InvalidLength { length: f64 },

    #[error("Take index {index} out of range for {item}")]
    TakeOutOfRange { item: ItemId, index: usize },

    #[error("Track index {index} out of range ({count} tracks)")]
    TrackIndexOutOfRange { index: usize, count: usize },
}

pub type Result<T> = std::result::Result<T, TimelineError>;

/// Item/track CRUD plus the edit group bracket
///
/// Track order is the display order; `track_ids()` lists tracks top to
/// bottom and `items_on_track()` lists items by ascending position.
pub trait TimelineHost {
    /// All tracks in display order
    fn track_ids(&self) -> Vec<TrackId>;

    fn track(&self, id: TrackId) -> Option<&Track>;

    /// Display index of a track
    fn track_index(&self, id: TrackId) -> Option<usize>;

    fn item(&self, id: ItemId) -> Option<&Item>;

    /// Items on a track ordered by position
    fn items_on_track(&self, track: TrackId) -> Vec<ItemId>;

    /// Insert a new empty track at `index` (index == track count appends)
    fn insert_track(&mut self, index: usize, name: &str) -> Result<TrackId>;

    fn set_track_color(&mut self, track: TrackId, color: Color) -> Result<()>;

    /// Nest `track` under the folder track `parent`
    fn set_track_parent(&mut self, track: TrackId, parent: TrackId) -> Result<()>;

    /// Remove a track together with all its items
    fn delete_track(&mut self, track: TrackId) -> Result<()>;

    /// Create an item with a single take
    fn add_item(&mut self, track: TrackId, position: f64, length: f64, take: Take)
        -> Result<ItemId>;

    /// Append a take to an item, returning its index
    fn add_take(&mut self, item: ItemId, take: Take) -> Result<usize>;

    fn set_active_take(&mut self, item: ItemId, index: usize) -> Result<()>;

    /// Split an item at timeline position `at`
    ///
    /// The original item keeps the left part; the returned id is the new
    /// right part. `at` must lie strictly inside the item.
    fn split_item(&mut self, item: ItemId, at: f64) -> Result<ItemId>;

    fn set_item_muted(&mut self, item: ItemId, muted: bool) -> Result<()>;

    fn delete_item(&mut self, item: ItemId) -> Result<()>;

    /// Open a named edit group; all edits until the matching
    /// `end_edit_group` are undone as one step
    fn begin_edit_group(&mut self, name: &str);

    fn end_edit_group(&mut self, name: &str);
}
