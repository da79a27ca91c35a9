pub mod sync_service;
pub mod scheduler;

pub use sync_service::{SyncService, SyncStats};
pub use scheduler::SyncScheduler;
