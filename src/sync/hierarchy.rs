//! Generic leveled-tree walk: each level fetches the children of the previous level's
//! stale nodes, merges the changed ones and hands only those down.
//!
//! A node with children is merged with its timestamp held back and is stamped only
//! after the whole walk succeeds and nothing below it was left incomplete. A pass that
//! stops half way therefore leaves the node stale, and the next pass walks it again.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::basecamp::BasecampApi;
use crate::basecamp::dto::{
    CardColumnDto, CardDto, CardTableDto, ProjectDto, TodoListDto, TodoSetDto,
};
use crate::db::{BulkUpsertEngine, Stamp, UpsertRecord, repository};
use crate::error::AppError;
use crate::sync::staleness::is_stale;

/// Everything a level needs to fetch and persist.
#[derive(Clone)]
pub struct SyncContext {
    pub api: Arc<dyn BasecampApi>,
    pub engine: BulkUpsertEngine,
}

impl SyncContext {
    pub fn new(api: Arc<dyn BasecampApi>, engine: BulkUpsertEngine) -> Self {
        Self { api, engine }
    }

    pub fn db(&self) -> &SqlitePool {
        self.engine.pool()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Project,
    TodoSet,
    TodoList,
    Todo,
    CardTable,
    CardColumn,
    Card,
    CardStep,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Project => "projects",
            Entity::TodoSet => "todosets",
            Entity::TodoList => "todolists",
            Entity::Todo => "todos",
            Entity::CardTable => "card tables",
            Entity::CardColumn => "card columns",
            Entity::Card => "cards",
            Entity::CardStep => "card steps",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum Payload {
    Project(ProjectDto),
    TodoSet(TodoSetDto),
    TodoList(TodoListDto),
    CardTable(CardTableDto),
    CardColumn(CardColumnDto),
    Card(CardDto),
}

/// A stale entity whose children still have to be visited.
#[derive(Debug, Clone)]
pub struct Node {
    pub payload: Payload,
    /// The entity's stored `updated_at` before this pass; `None` for entities seen for
    /// the first time, whose children are then fetched unfiltered.
    pub cursor: Option<DateTime<Utc>>,
    /// Set when the node's row was merged with its timestamp held back.
    pub stamp: Option<Stamp>,
}

impl Node {
    pub fn new(payload: Payload, cursor: Option<DateTime<Utc>>) -> Self {
        Self {
            payload,
            cursor,
            stamp: None,
        }
    }

    pub fn with_stamp(mut self, stamp: Option<Stamp>) -> Self {
        self.stamp = stamp;
        self
    }
}

#[derive(Debug, Default)]
pub struct LevelOutcome {
    pub children: Vec<Node>,
    pub written: u64,
    /// The parent's children could not all be mirrored; it and its ancestors stay
    /// unstamped.
    pub incomplete: bool,
}

impl LevelOutcome {
    pub fn incomplete() -> Self {
        Self {
            incomplete: true,
            ..Self::default()
        }
    }
}

/// Result of one tree walk.
#[derive(Debug, Default)]
pub struct WalkReport {
    /// Rows written per level, in level order.
    pub written: Vec<(Entity, u64)>,
    /// False when some subtree was left incomplete. The root must not be finalized.
    pub complete: bool,
}

/// A node reached during the walk and where it hangs.
struct Visit {
    parent: Option<usize>,
    stamp: Option<Stamp>,
    complete: bool,
}

fn mark_incomplete(visits: &mut [Visit], from: usize) {
    let mut at = Some(from);
    while let Some(index) = at {
        if !visits[index].complete {
            break;
        }
        visits[index].complete = false;
        at = visits[index].parent;
    }
}

#[async_trait]
pub trait HierarchyLevel: Send + Sync {
    /// What this level writes, for statistics.
    fn entity(&self) -> Entity;

    /// Whether the parents stay in the frontier alongside the children. Used for the
    /// one-deep nesting of todo lists, where the next level applies to both.
    fn retains_parents(&self) -> bool {
        false
    }

    async fn sync_children(
        &self,
        ctx: &SyncContext,
        parent: &Node,
    ) -> Result<LevelOutcome, AppError>;
}

/// Walk `levels` breadth-first from `root`. Stops as soon as a level yields no stale
/// nodes. Deferred rows of fully mirrored subtrees are stamped at the end, in one
/// transaction; an error anywhere leaves all of them unstamped.
pub async fn walk(
    ctx: &SyncContext,
    root: Node,
    levels: &[Box<dyn HierarchyLevel>],
) -> Result<WalkReport, AppError> {
    let mut visits = vec![Visit {
        parent: None,
        stamp: root.stamp,
        complete: true,
    }];
    let mut frontier = vec![(0, root)];
    let mut written = Vec::with_capacity(levels.len());

    for level in levels {
        if frontier.is_empty() {
            break;
        }

        let mut children = Vec::new();
        let mut count = 0;
        for (index, parent) in &frontier {
            let outcome = level.sync_children(ctx, parent).await?;
            count += outcome.written;
            if outcome.incomplete {
                mark_incomplete(&mut visits, *index);
            }
            for child in outcome.children {
                visits.push(Visit {
                    parent: Some(*index),
                    stamp: child.stamp,
                    complete: true,
                });
                children.push((visits.len() - 1, child));
            }
        }
        debug!(
            "{}: {} parents, {} stale, {} written",
            level.entity(),
            frontier.len(),
            children.len(),
            count
        );
        written.push((level.entity(), count));

        if level.retains_parents() {
            frontier.extend(children);
        } else {
            frontier = children;
        }
    }

    // Deepest first.
    let stamps: Vec<Stamp> = visits
        .iter()
        .rev()
        .filter(|visit| visit.complete)
        .filter_map(|visit| visit.stamp)
        .collect();
    ctx.engine.apply_stamps(&stamps).await?;

    Ok(WalkReport {
        written,
        complete: visits[0].complete,
    })
}

pub struct StaleItem<D> {
    pub item: D,
    pub cursor: Option<DateTime<Utc>>,
    pub stamp: Option<Stamp>,
}

pub struct Batch<D> {
    pub stale: Vec<StaleItem<D>>,
    pub written: u64,
}

impl<D> Batch<D> {
    pub fn into_outcome(self, wrap: impl Fn(D) -> Payload) -> LevelOutcome {
        LevelOutcome {
            children: self
                .stale
                .into_iter()
                .map(|stale| Node::new(wrap(stale.item), stale.cursor).with_stamp(stale.stamp))
                .collect(),
            written: self.written,
            incomplete: false,
        }
    }
}

/// Snapshot the stored timestamps of `items`, merge the stale ones in one upsert and
/// return them with their pre-merge timestamps. A repeated id keeps its last occurrence.
/// For leaf entities.
pub async fn sync_batch<D, R, F>(
    ctx: &SyncContext,
    items: Vec<D>,
    to_row: F,
) -> Result<Batch<D>, AppError>
where
    D: Send,
    R: UpsertRecord,
    F: Fn(&D) -> R,
{
    merge_batch(ctx, items, to_row, false).await
}

/// Like [`sync_batch`], for entities with children: rows are merged with their
/// timestamps held back, and each stale item carries the stamp `walk` applies once its
/// subtree is mirrored.
pub async fn sync_parent_batch<D, R, F>(
    ctx: &SyncContext,
    items: Vec<D>,
    to_row: F,
) -> Result<Batch<D>, AppError>
where
    D: Send,
    R: UpsertRecord,
    F: Fn(&D) -> R,
{
    merge_batch(ctx, items, to_row, true).await
}

async fn merge_batch<D, R, F>(
    ctx: &SyncContext,
    items: Vec<D>,
    to_row: F,
    deferred: bool,
) -> Result<Batch<D>, AppError>
where
    D: Send,
    R: UpsertRecord,
    F: Fn(&D) -> R,
{
    let mut unique: Vec<(D, R)> = Vec::with_capacity(items.len());
    let mut position: HashMap<i64, usize> = HashMap::new();
    for item in items {
        let row = to_row(&item);
        match position.get(&row.id()) {
            Some(&at) => unique[at] = (item, row),
            None => {
                position.insert(row.id(), unique.len());
                unique.push((item, row));
            }
        }
    }

    if unique.is_empty() {
        return Ok(Batch {
            stale: Vec::new(),
            written: 0,
        });
    }

    let ids: Vec<i64> = unique.iter().map(|(_, row)| row.id()).collect();
    let snapshot = repository::snapshot_timestamps(ctx.db(), R::TABLE, &ids).await?;

    let mut rows = Vec::new();
    let mut stale = Vec::new();
    for (item, row) in unique {
        let existing = snapshot.get(&row.id()).copied().flatten();
        let changed = match row.updated_at() {
            Some(incoming) => is_stale(existing, incoming),
            None => true,
        };
        if changed {
            let stamp = match (deferred, row.updated_at()) {
                (true, Some(updated_at)) => Some(Stamp {
                    table: R::TABLE,
                    id: row.id(),
                    updated_at,
                }),
                _ => None,
            };
            rows.push(row);
            stale.push(StaleItem {
                item,
                cursor: existing,
                stamp,
            });
        }
    }

    let written = if deferred {
        ctx.engine.upsert_deferred(&rows).await?
    } else {
        ctx.engine.upsert(&rows).await?
    };
    Ok(Batch { stale, written })
}
