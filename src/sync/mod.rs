pub mod hierarchy;
pub mod levels;
pub mod progress;
pub mod staleness;

pub use hierarchy::{Entity, HierarchyLevel, SyncContext, WalkReport, walk};
pub use progress::{Progress, ProgressSink};
