use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::basecamp::BasecampApi;
use crate::basecamp::dto::{ProjectDto, decode_all};
use crate::db::{BulkUpsertEngine, repository, sync_state};
use crate::error::AppError;
use crate::models::Project;
use crate::sync::hierarchy::{
    Entity, HierarchyLevel, Node, Payload, StaleItem, SyncContext, walk,
};
use crate::sync::levels;
use crate::sync::progress::{Progress, ProgressSink};
use crate::sync::staleness::is_stale;

/// Buffered progress lines before a slow consumer stalls the pass.
pub const PROGRESS_BUFFER: usize = 64;

pub struct SyncService {
    db: SqlitePool,
    api: Arc<dyn BasecampApi>,
    batch_size: usize,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncStats {
    pub projects_fetched: usize,
    pub projects_synced: usize,
    pub projects: u64,
    pub todosets: u64,
    pub todolists: u64,
    pub todos: u64,
    pub card_tables: u64,
    pub card_columns: u64,
    pub cards: u64,
    pub card_steps: u64,
    pub completions: u64,
}

impl SyncStats {
    pub fn record(&mut self, entity: Entity, written: u64) {
        let counter = match entity {
            Entity::Project => &mut self.projects,
            Entity::TodoSet => &mut self.todosets,
            Entity::TodoList => &mut self.todolists,
            Entity::Todo => &mut self.todos,
            Entity::CardTable => &mut self.card_tables,
            Entity::CardColumn => &mut self.card_columns,
            Entity::Card => &mut self.cards,
            Entity::CardStep => &mut self.card_steps,
        };
        *counter += written;
    }

    /// Rows inserted or updated across every table.
    pub fn rows_written(&self) -> u64 {
        self.projects
            + self.todosets
            + self.todolists
            + self.todos
            + self.card_tables
            + self.card_columns
            + self.cards
            + self.card_steps
            + self.completions
    }
}

impl SyncService {
    pub fn new(db: SqlitePool, api: Arc<dyn BasecampApi>, batch_size: usize) -> Self {
        Self {
            db,
            api,
            batch_size,
        }
    }

    pub async fn sync_all(&self) -> Result<SyncStats, AppError> {
        self.run(&ProgressSink::silent()).await
    }

    /// Run one pass, reporting on `tx`. Dropping the receiver cancels the pass at the
    /// next progress line.
    pub async fn sync_with_progress(
        &self,
        tx: mpsc::Sender<Progress>,
    ) -> Result<SyncStats, AppError> {
        self.run(&ProgressSink::new(tx)).await
    }

    /// Like `sync_with_progress`, but a failure becomes the terminal `Failed` line.
    pub async fn report(&self, tx: mpsc::Sender<Progress>) {
        match self.sync_with_progress(tx.clone()).await {
            Ok(stats) => info!("Streamed sync finished: {} rows written", stats.rows_written()),
            Err(AppError::Cancelled) => warn!("Sync cancelled: progress consumer went away"),
            Err(e) => {
                error!("Sync failed: {}", e);
                let _ = tx.send(Progress::Failed(e.to_string())).await;
            }
        }
    }

    async fn run(&self, progress: &ProgressSink) -> Result<SyncStats, AppError> {
        info!("Starting sync...");
        let ctx = SyncContext::new(
            self.api.clone(),
            BulkUpsertEngine::new(self.db.clone(), self.batch_size),
        );
        let mut stats = SyncStats::default();

        let stale = self.detect_stale_projects(&mut stats).await?;
        info!(
            "{} projects fetched, {} need syncing",
            stats.projects_fetched,
            stale.len()
        );
        progress.total(stale.len() * 2).await?;

        let card_tree = levels::card_tree();
        let todo_tree = levels::todo_tree();
        // Once a project is left incomplete the projects checkpoint stays put, so the
        // next pass fetches that project again.
        let mut hold_checkpoint = false;

        for StaleItem {
            item: project,
            cursor,
            ..
        } in stale
        {
            progress
                .message(format!("Syncing project '{}'", project.name))
                .await?;
            let root = Node::new(Payload::Project(project.clone()), cursor);

            progress.message("  Syncing cards hierarchy...").await?;
            let cards_complete = self
                .walk_tree(&ctx, root.clone(), &card_tree, &mut stats)
                .await?;
            sync_state::set_last_sync_now(&self.db, "cards").await?;
            progress.step().await?;

            progress.message("  Syncing todos hierarchy...").await?;
            let todos_complete = self.walk_tree(&ctx, root, &todo_tree, &mut stats).await?;
            stats.completions += levels::sync_todo_completions(&ctx, project.id).await?;
            sync_state::set_last_sync_now(&self.db, "todos").await?;
            progress.step().await?;

            if !(cards_complete && todos_complete) {
                warn!(
                    "Project {} left incomplete, it stays stale until the next pass",
                    project.id
                );
                hold_checkpoint = true;
                progress
                    .message(format!("Project '{}' left incomplete.", project.name))
                    .await?;
                continue;
            }

            let written = ctx.engine.upsert(&[Project::from(&project)]).await?;
            stats.record(Entity::Project, written);
            if !hold_checkpoint {
                sync_state::advance_last_sync(&self.db, "projects", project.updated_at).await?;
            }
            stats.projects_synced += 1;

            progress
                .message(format!("Project '{}' updated.", project.name))
                .await?;
        }

        progress.message("All done!").await?;
        info!("Sync completed successfully: {:?}", stats);
        Ok(stats)
    }

    /// Walk one tree under a project. Returns whether every subtree was mirrored.
    async fn walk_tree(
        &self,
        ctx: &SyncContext,
        root: Node,
        tree: &[Box<dyn HierarchyLevel>],
        stats: &mut SyncStats,
    ) -> Result<bool, AppError> {
        let report = walk(ctx, root, tree).await?;
        for (entity, written) in report.written {
            stats.record(entity, written);
        }
        Ok(report.complete)
    }

    /// Fetch projects changed since the last pass and pick the ones whose stored copy is
    /// missing or out of date, oldest first. Unseen projects get a placeholder row.
    async fn detect_stale_projects(
        &self,
        stats: &mut SyncStats,
    ) -> Result<Vec<StaleItem<ProjectDto>>, AppError> {
        let since = sync_state::get_last_sync(&self.db, "projects").await?;
        let raw = self.api.fetch_all("projects.json", since).await?;
        let fetched: Vec<ProjectDto> = decode_all("project", raw);
        stats.projects_fetched = fetched.len();

        let projects: HashMap<i64, ProjectDto> =
            fetched.into_iter().map(|p| (p.id, p)).collect();
        let ids: Vec<i64> = projects.keys().copied().collect();
        let snapshot = repository::snapshot_timestamps(&self.db, "projects", &ids).await?;

        let mut stale = Vec::new();
        for project in projects.into_values() {
            match snapshot.get(&project.id) {
                None => {
                    if repository::insert_project_placeholder(&self.db, project.id, &project.name)
                        .await?
                    {
                        stats.record(Entity::Project, 1);
                    }
                    stale.push(StaleItem {
                        item: project,
                        cursor: None,
                        stamp: None,
                    });
                }
                Some(existing) if is_stale(*existing, project.updated_at) => {
                    stale.push(StaleItem {
                        item: project,
                        cursor: *existing,
                        stamp: None,
                    });
                }
                Some(_) => {}
            }
        }

        stale.sort_by_key(|s| (s.item.updated_at, s.item.id));
        Ok(stale)
    }
}
