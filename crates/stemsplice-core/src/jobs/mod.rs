//! Jobs and batches
//!
//! A [`Job`] is one rendered span handed to one worker process; a [`Batch`]
//! is every job created from a single user action. Jobs are created once,
//! in planner order, and only their status/progress fields change afterward.

mod batch;
mod job;
mod layout;
mod prepare;

pub use batch::{Batch, BatchMode, BatchStatus, ChunkProfile};
pub use job::{Job, JobId, JobStatus, WAITING_STAGE};
pub use layout::JobLayout;
pub use prepare::{prepare_batch, BatchRequest, PrepareError};

#[cfg(test)]
pub(crate) use job::tests::test_job;
