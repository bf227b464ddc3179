//! Timeline model and host contract
//!
//! The reconciler edits the timeline only through the [`TimelineHost`]
//! trait: track/item CRUD, split-at-time, mute, color, takes and a named
//! edit group bracket used for single-step undo.
//!
//! [`Timeline`] is the in-memory implementation used by the command line
//! front end (serialized as the project file) and by the tests.

mod host;
mod memory;
mod model;

pub use host::{TimelineError, TimelineHost};
pub use memory::Timeline;
pub use model::{Item, Take, Track};
