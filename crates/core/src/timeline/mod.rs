//! Main-line timeline tracking.
//!
//! Each tracked file carries the main-line commits that touched it and one
//! view per task working on it. Drift and merge context are computed from
//! those two pieces.

pub mod model;
pub mod tracker;

pub use model::{
    BranchPoint, EventSource, FileTimeline, FileTrackingState, MainBranchEvent, MainLineCommit,
    MergeContext, PendingTask, TaskFileView, TaskStatus,
};
pub use tracker::TimelineTracker;
