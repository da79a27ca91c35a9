use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::SyncState;
use crate::sync::staleness::normalize;

pub async fn get_last_sync(
    db: &SqlitePool,
    resource: &str,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar("SELECT last_refreshed_at FROM sync_state WHERE resource = ?1")
        .bind(resource)
        .fetch_optional(db)
        .await
}

/// Record `at` as the checkpoint for `resource`, replacing any previous value.
pub async fn set_last_sync(
    db: &SqlitePool,
    resource: &str,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sync_state (resource, last_refreshed_at)
        VALUES (?1, ?2)
        ON CONFLICT(resource) DO UPDATE SET last_refreshed_at = excluded.last_refreshed_at
        "#,
    )
    .bind(resource)
    .bind(normalize(at))
    .execute(db)
    .await?;

    Ok(())
}

pub async fn set_last_sync_now(db: &SqlitePool, resource: &str) -> Result<(), sqlx::Error> {
    set_last_sync(db, resource, Utc::now()).await
}

/// Like `set_last_sync`, but never moves an existing checkpoint backwards.
pub async fn advance_last_sync(
    db: &SqlitePool,
    resource: &str,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    match get_last_sync(db, resource).await? {
        Some(current) if current >= normalize(at) => Ok(()),
        _ => set_last_sync(db, resource, at).await,
    }
}

pub async fn list_sync_state(db: &SqlitePool) -> Result<Vec<SyncState>, sqlx::Error> {
    sqlx::query_as::<_, SyncState>(
        "SELECT resource, last_refreshed_at FROM sync_state ORDER BY resource",
    )
    .fetch_all(db)
    .await
}
