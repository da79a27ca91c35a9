use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::query_builder::Separated;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::AppError;

/// A row type the engine knows how to stage and merge.
pub trait UpsertRecord: Send + Sync {
    const TABLE: &'static str;
    /// Column list in bind order; the primary key `id` comes first.
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> i64;
    fn updated_at(&self) -> Option<DateTime<Utc>>;
    /// Bind one value per entry of `COLUMNS`, in order.
    fn push_row(&self, row: Separated<'_, '_, Sqlite, &'static str>);
}

/// The upstream `updated_at` a deferred row receives once everything below it is
/// mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub table: &'static str,
    pub id: i64,
    pub updated_at: DateTime<Utc>,
}

/// A many-to-many assignee table hanging off one parent table.
#[derive(Debug, Clone, Copy)]
pub struct Relation {
    pub table: &'static str,
    pub parent_column: &'static str,
}

/// Staging-and-merge writer. Each `upsert` call is one transaction.
#[derive(Clone)]
pub struct BulkUpsertEngine {
    db: SqlitePool,
    chunk_size: usize,
}

impl BulkUpsertEngine {
    pub fn new(db: SqlitePool, chunk_size: usize) -> Self {
        Self {
            db,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Stage `rows`, keep the last staged row per id, merge into `R::TABLE`.
    /// Returns the number of rows inserted or updated.
    pub async fn upsert<R: UpsertRecord>(&self, rows: &[R]) -> Result<u64, AppError> {
        self.merge(rows, false).await
    }

    /// Like `upsert`, but `updated_at` is left alone: existing rows keep their stored
    /// value and new rows get NULL. The row stays stale until [`Self::apply_stamps`]
    /// records its upstream timestamp.
    pub async fn upsert_deferred<R: UpsertRecord>(&self, rows: &[R]) -> Result<u64, AppError> {
        self.merge(rows, true).await
    }

    async fn merge<R: UpsertRecord>(&self, rows: &[R], deferred: bool) -> Result<u64, AppError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let staging = format!("staging_{}", R::TABLE);
        let columns = R::COLUMNS.join(", ");
        let merged_column = |column: &str| !(deferred && column == "updated_at");
        let selected = R::COLUMNS
            .iter()
            .map(|&column| if merged_column(column) { column } else { "NULL" })
            .collect::<Vec<_>>()
            .join(", ");
        let updates = R::COLUMNS
            .iter()
            .skip(1)
            .filter(|&&column| merged_column(column))
            .map(|column| format!("{column} = excluded.{column}"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut tx = self.db.begin().await?;

        sqlx::query(&format!("DROP TABLE IF EXISTS temp.{staging}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "CREATE TEMP TABLE {staging} (seq INTEGER PRIMARY KEY, {columns})"
        ))
        .execute(&mut *tx)
        .await?;

        for chunk in rows.chunks(self.chunk_size) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("INSERT INTO {staging} ({columns}) "));
            qb.push_values(chunk, |row, record| record.push_row(row));
            qb.build().execute(&mut *tx).await?;
        }

        sqlx::query(&format!(
            "DELETE FROM {staging} WHERE seq NOT IN (SELECT MAX(seq) FROM {staging} GROUP BY id)"
        ))
        .execute(&mut *tx)
        .await?;

        // `WHERE true` keeps SQLite from reading ON CONFLICT as a join constraint.
        let merged = sqlx::query(&format!(
            "INSERT INTO {table} ({columns}) SELECT {selected} FROM {staging} WHERE true \
             ON CONFLICT(id) DO UPDATE SET {updates}",
            table = R::TABLE,
        ))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(&format!("DROP TABLE temp.{staging}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("merged {} rows into {}", merged, R::TABLE);
        Ok(merged)
    }

    /// Record the upstream timestamps of rows written with `upsert_deferred`. One
    /// transaction.
    pub async fn apply_stamps(&self, stamps: &[Stamp]) -> Result<u64, AppError> {
        if stamps.is_empty() {
            return Ok(0);
        }

        let mut tx = self.db.begin().await?;
        let mut stamped = 0;
        for stamp in stamps {
            stamped += sqlx::query(&format!(
                "UPDATE {} SET updated_at = ?1 WHERE id = ?2",
                stamp.table
            ))
            .bind(stamp.updated_at)
            .bind(stamp.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        debug!("stamped {} deferred rows", stamped);
        Ok(stamped)
    }

    /// Replace the full assignee set of every listed parent. A parent listed with an
    /// empty set ends up with no relation rows. Returns the number of rows inserted.
    pub async fn replace_relations(
        &self,
        relation: Relation,
        sets: &[(i64, Vec<i64>)],
    ) -> Result<u64, AppError> {
        if sets.is_empty() {
            return Ok(0);
        }

        let latest: BTreeMap<i64, &Vec<i64>> =
            sets.iter().map(|(parent, members)| (*parent, members)).collect();
        let parent_ids: Vec<i64> = latest.keys().copied().collect();
        let pairs: Vec<(i64, i64)> = latest
            .iter()
            .flat_map(|(parent, members)| members.iter().map(move |member| (*parent, *member)))
            .collect();

        let mut tx = self.db.begin().await?;

        for chunk in parent_ids.chunks(self.chunk_size) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "DELETE FROM {} WHERE {} IN (",
                relation.table, relation.parent_column
            ));
            let mut ids = qb.separated(", ");
            for id in chunk {
                ids.push_bind(*id);
            }
            ids.push_unseparated(")");
            qb.build().execute(&mut *tx).await?;
        }

        let mut inserted = 0;
        for chunk in pairs.chunks(self.chunk_size) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "INSERT OR IGNORE INTO {} ({}, assignee_id) ",
                relation.table, relation.parent_column
            ));
            qb.push_values(chunk, |mut row, (parent, assignee)| {
                row.push_bind(*parent).push_bind(*assignee);
            });
            inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }
}
