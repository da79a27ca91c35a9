use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::basecamp::BasecampApi;
use crate::services::SyncService;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub basecamp: Arc<dyn BasecampApi>,
    pub batch_size: usize,
    /// Held for the duration of a sync pass.
    pub sync_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(db: SqlitePool, basecamp: Arc<dyn BasecampApi>, batch_size: usize) -> Self {
        Self {
            db,
            basecamp,
            batch_size,
            sync_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn sync_service(&self) -> SyncService {
        SyncService::new(self.db.clone(), self.basecamp.clone(), self.batch_size)
    }
}
