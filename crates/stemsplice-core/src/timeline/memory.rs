//! In-memory timeline with snapshot undo
//!
//! Serialized as the project file of the command line front end. Edit
//! groups snapshot the whole state when they open; `undo()` restores the
//! snapshot of the most recent closed group.

use serde::{Deserialize, Serialize};

use super::host::{Result, TimelineError, TimelineHost};
use super::model::{Item, Take, Track};
use crate::types::{Color, ItemId, TrackId, TIME_EPSILON};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct TimelineState {
    tracks: Vec<Track>,
    items: Vec<Item>,
    next_id: u64,
}

#[derive(Debug, Clone)]
struct OpenGroup {
    name: String,
    depth: usize,
    before: TimelineState,
}

#[derive(Debug, Clone)]
struct UndoStep {
    name: String,
    before: TimelineState,
}

/// On-disk shape of a timeline (the id counter may be omitted)
#[derive(Serialize, Deserialize)]
struct TimelineFile {
    #[serde(default)]
    tracks: Vec<Track>,
    #[serde(default)]
    items: Vec<Item>,
    #[serde(default)]
    next_id: u64,
}

/// In-memory implementation of [`TimelineHost`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "TimelineFile", into = "TimelineFile")]
pub struct Timeline {
    state: TimelineState,
    open_group: Option<OpenGroup>,
    undo_stack: Vec<UndoStep>,
}

impl From<TimelineFile> for Timeline {
    fn from(file: TimelineFile) -> Self {
        // Never hand out an id that is already in use, whatever the file says
        let max_used = file
            .tracks
            .iter()
            .map(|t| t.id.0)
            .chain(file.items.iter().map(|i| i.id.0))
            .max()
            .unwrap_or(0);
        Self {
            state: TimelineState {
                tracks: file.tracks,
                items: file.items,
                next_id: file.next_id.max(max_used + 1),
            },
            open_group: None,
            undo_stack: Vec::new(),
        }
    }
}

impl From<Timeline> for TimelineFile {
    fn from(timeline: Timeline) -> Self {
        Self {
            tracks: timeline.state.tracks,
            items: timeline.state.items,
            next_id: timeline.state.next_id,
        }
    }
}

impl Timeline {
    pub fn new() -> Self {
        Self {
            state: TimelineState {
                next_id: 1,
                ..Default::default()
            },
            open_group: None,
            undo_stack: Vec::new(),
        }
    }

    /// Append a track at the bottom of the timeline
    pub fn add_track(&mut self, name: &str) -> TrackId {
        let id = TrackId(self.allocate_id());
        self.state.tracks.push(Track {
            id,
            name: name.to_string(),
            color: None,
            parent: None,
            is_folder: false,
        });
        id
    }

    /// All tracks in display order
    pub fn tracks(&self) -> &[Track] {
        &self.state.tracks
    }

    /// All items, unordered
    pub fn items(&self) -> &[Item] {
        &self.state.items
    }

    /// Number of edit groups that can be undone
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Revert the most recent closed edit group
    ///
    /// Returns the group's name, or `None` if there is nothing to undo or a
    /// group is still open.
    pub fn undo(&mut self) -> Option<String> {
        if self.open_group.is_some() {
            log::warn!("undo: Edit group still open, refusing to undo");
            return None;
        }
        let step = self.undo_stack.pop()?;
        self.state = step.before;
        log::info!("undo: Reverted '{}'", step.name);
        Some(step.name)
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.state.next_id.max(1);
        self.state.next_id = id + 1;
        id
    }

    fn item_mut(&mut self, id: ItemId) -> Result<&mut Item> {
        self.state
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(TimelineError::UnknownItem(id))
    }

    fn track_mut(&mut self, id: TrackId) -> Result<&mut Track> {
        self.state
            .tracks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(TimelineError::UnknownTrack(id))
    }

    fn require_track(&self, id: TrackId) -> Result<()> {
        self.track(id).map(|_| ()).ok_or(TimelineError::UnknownTrack(id))
    }
}

impl TimelineHost for Timeline {
    fn track_ids(&self) -> Vec<TrackId> {
        self.state.tracks.iter().map(|t| t.id).collect()
    }

    fn track(&self, id: TrackId) -> Option<&Track> {
        self.state.tracks.iter().find(|t| t.id == id)
    }

    fn track_index(&self, id: TrackId) -> Option<usize> {
        self.state.tracks.iter().position(|t| t.id == id)
    }

    fn item(&self, id: ItemId) -> Option<&Item> {
        self.state.items.iter().find(|i| i.id == id)
    }

    fn items_on_track(&self, track: TrackId) -> Vec<ItemId> {
        let mut items: Vec<&Item> = self
            .state
            .items
            .iter()
            .filter(|i| i.track == track)
            .collect();
        items.sort_by(|a, b| a.position.total_cmp(&b.position).then(a.id.cmp(&b.id)));
        items.into_iter().map(|i| i.id).collect()
    }

    fn insert_track(&mut self, index: usize, name: &str) -> Result<TrackId> {
        let count = self.state.tracks.len();
        if index > count {
            return Err(TimelineError::TrackIndexOutOfRange { index, count });
        }
        let id = TrackId(self.allocate_id());
        self.state.tracks.insert(
            index,
            Track {
                id,
                name: name.to_string(),
                color: None,
                parent: None,
                is_folder: false,
            },
        );
        log::debug!("insert_track: '{}' as {} at index {}", name, id, index);
        Ok(id)
    }

    fn set_track_color(&mut self, track: TrackId, color: Color) -> Result<()> {
        self.track_mut(track)?.color = Some(color);
        Ok(())
    }

    fn set_track_parent(&mut self, track: TrackId, parent: TrackId) -> Result<()> {
        self.require_track(track)?;
        self.track_mut(parent)?.is_folder = true;
        self.track_mut(track)?.parent = Some(parent);
        Ok(())
    }

    fn delete_track(&mut self, track: TrackId) -> Result<()> {
        let index = self
            .track_index(track)
            .ok_or(TimelineError::UnknownTrack(track))?;
        self.state.tracks.remove(index);
        self.state.items.retain(|i| i.track != track);
        for child in self.state.tracks.iter_mut().filter(|t| t.parent == Some(track)) {
            child.parent = None;
        }
        log::debug!("delete_track: Removed {} (index {})", track, index);
        Ok(())
    }

    fn add_item(
        &mut self,
        track: TrackId,
        position: f64,
        length: f64,
        take: Take,
    ) -> Result<ItemId> {
        self.require_track(track)?;
        if !(length > 0.0) || !length.is_finite() {
            return Err(TimelineError::InvalidLength { length });
        }
        let id = ItemId(self.allocate_id());
        self.state.items.push(Item {
            id,
            track,
            position,
            length,
            muted: false,
            takes: vec![take],
            active_take: 0,
        });
        log::debug!(
            "add_item: {} on {} at {:.3}s ({:.3}s)",
            id,
            track,
            position,
            length
        );
        Ok(id)
    }

    fn add_take(&mut self, item: ItemId, take: Take) -> Result<usize> {
        let item = self.item_mut(item)?;
        item.takes.push(take);
        Ok(item.takes.len() - 1)
    }

    fn set_active_take(&mut self, item: ItemId, index: usize) -> Result<()> {
        let item_ref = self.item_mut(item)?;
        if index >= item_ref.takes.len() {
            return Err(TimelineError::TakeOutOfRange { item, index });
        }
        item_ref.active_take = index;
        Ok(())
    }

    fn split_item(&mut self, item: ItemId, at: f64) -> Result<ItemId> {
        let original = self
            .item(item)
            .cloned()
            .ok_or(TimelineError::UnknownItem(item))?;
        if at <= original.position + TIME_EPSILON || at >= original.end() - TIME_EPSILON {
            return Err(TimelineError::SplitOutOfBounds { item, at });
        }

        let left_length = at - original.position;
        let right_id = ItemId(self.allocate_id());
        let mut right = original.clone();
        right.id = right_id;
        right.position = at;
        right.length = original.end() - at;
        for take in &mut right.takes {
            take.source_offset += left_length;
        }

        let index = self
            .state
            .items
            .iter()
            .position(|i| i.id == item)
            .ok_or(TimelineError::UnknownItem(item))?;
        self.state.items[index].length = left_length;
        self.state.items.insert(index + 1, right);
        log::debug!("split_item: {} at {:.3}s -> right part {}", item, at, right_id);
        Ok(right_id)
    }

    fn set_item_muted(&mut self, item: ItemId, muted: bool) -> Result<()> {
        self.item_mut(item)?.muted = muted;
        Ok(())
    }

    fn delete_item(&mut self, item: ItemId) -> Result<()> {
        let before = self.state.items.len();
        self.state.items.retain(|i| i.id != item);
        if self.state.items.len() == before {
            return Err(TimelineError::UnknownItem(item));
        }
        Ok(())
    }

    fn begin_edit_group(&mut self, name: &str) {
        match &mut self.open_group {
            Some(group) => group.depth += 1,
            None => {
                self.open_group = Some(OpenGroup {
                    name: name.to_string(),
                    depth: 1,
                    before: self.state.clone(),
                });
            }
        }
    }

    fn end_edit_group(&mut self, name: &str) {
        let Some(group) = &mut self.open_group else {
            log::warn!("end_edit_group: '{}' closed without being opened", name);
            return;
        };
        group.depth -= 1;
        if group.depth > 0 {
            return;
        }
        if let Some(group) = self.open_group.take() {
            if self.state != group.before {
                self.undo_stack.push(UndoStep {
                    name: group.name,
                    before: group.before,
                });
            }
        }
    }
}
