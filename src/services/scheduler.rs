use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::basecamp::BasecampApi;
use crate::error::AppError;
use crate::services::sync_service::{SyncService, SyncStats};

/// Periodic sync pass against Basecamp.
pub struct SyncScheduler {
    db: SqlitePool,
    api: Arc<dyn BasecampApi>,
    batch_size: usize,
    interval: Duration,
    lock: Arc<Mutex<()>>,
}

impl SyncScheduler {
    pub fn new(
        db: SqlitePool,
        api: Arc<dyn BasecampApi>,
        batch_size: usize,
        interval_secs: u64,
    ) -> Self {
        Self {
            db,
            api,
            batch_size,
            interval: Duration::from_secs(interval_secs),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Share the lock that serializes passes with other triggers.
    pub fn with_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.lock = lock;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run forever, one pass per interval. Failures are logged and the loop continues.
    pub async fn start(self) {
        info!("Starting auto-sync scheduler (interval: {:?})", self.interval);

        loop {
            tokio::time::sleep(self.interval).await;

            match self.run_sync().await {
                Ok(stats) => {
                    info!(
                        "Auto-sync completed - {} of {} projects synced, {} rows written",
                        stats.projects_synced,
                        stats.projects_fetched,
                        stats.rows_written()
                    );
                }
                Err(e) => {
                    warn!("Auto-sync failed: {:?}", e);
                }
            }
        }
    }

    /// One pass, waiting for any pass already in flight to finish first.
    pub async fn run_sync(&self) -> Result<SyncStats, AppError> {
        let _guard = self.lock.lock().await;
        let service = SyncService::new(self.db.clone(), self.api.clone(), self.batch_size);
        service.sync_all().await
    }
}
