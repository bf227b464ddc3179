//! stemsplice core: stem separation jobs for multi-track timelines
//!
//! Extracts audio spans from a timeline selection, runs an external
//! separation worker per span, follows their progress through files and
//! writes the resulting stems back into the timeline as one undoable edit.
//!
//! ```text
//! Selection ─► planner ─► render ─► jobs ─► orchestrator ─► reconcile
//!                                    │        (tick loop)       │
//!                                    └── worker processes ──────┘
//!                                        stdout / log / done / stems/
//! ```

pub mod config;
pub mod error;
pub mod jobs;
pub mod orchestrator;
pub mod pipeline;
pub mod planner;
pub mod progress;
pub mod reconcile;
pub mod render;
pub mod stems;
pub mod timeline;
pub mod types;
pub mod worker;

#[cfg(test)]
mod scenarios;

pub use error::{ErrorAction, Result, StemspliceError};
pub use types::*;
