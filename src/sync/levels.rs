//! The concrete levels of the two per-project trees.
//!
//! Todo tree: project → todoset → todolist (+ one nested level) → todo.
//! Card tree: project → card table → column → card → step.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::hierarchy::{
    Entity, HierarchyLevel, LevelOutcome, Node, Payload, SyncContext, sync_batch,
    sync_parent_batch,
};
use crate::basecamp::dto::{
    CardColumnDto, CardDetailDto, CardDto, CardStepDto, CardTableDto, TodoDto, TodoListDto,
    TodoRecordingDto, TodoSetDto, decode, decode_all, ids,
};
use crate::db::records::{CARD_ASSIGNEES, CARD_STEP_ASSIGNEES, TODO_ASSIGNEES};
use crate::db::{repository, sync_state};
use crate::error::AppError;
use crate::models::{Card, CardColumn, CardStep, CardTable, Todo, TodoList, TodoSet};

pub fn todo_tree() -> Vec<Box<dyn HierarchyLevel>> {
    vec![
        Box::new(TodoSetLevel),
        Box::new(TodoListLevel),
        Box::new(NestedTodoListLevel),
        Box::new(TodoLevel),
    ]
}

pub fn card_tree() -> Vec<Box<dyn HierarchyLevel>> {
    vec![
        Box::new(CardTableLevel),
        Box::new(CardColumnLevel),
        Box::new(CardLevel),
        Box::new(CardStepLevel),
    ]
}

/// Append `pair` to a URL that may already carry a query string.
fn with_query(url: &str, pair: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{pair}")
}

pub struct TodoSetLevel;

#[async_trait]
impl HierarchyLevel for TodoSetLevel {
    fn entity(&self) -> Entity {
        Entity::TodoSet
    }

    async fn sync_children(
        &self,
        ctx: &SyncContext,
        parent: &Node,
    ) -> Result<LevelOutcome, AppError> {
        let Payload::Project(project) = &parent.payload else {
            return Ok(LevelOutcome::default());
        };

        let mut raw = Vec::new();
        for url in project.dock_urls("todoset") {
            raw.extend(ctx.api.fetch_all(&url, parent.cursor).await?);
        }

        let sets: Vec<TodoSetDto> = decode_all("todoset", raw);
        let batch = sync_parent_batch(ctx, sets, |dto| TodoSet::from(dto)).await?;
        Ok(batch.into_outcome(Payload::TodoSet))
    }
}

pub struct TodoListLevel;

#[async_trait]
impl HierarchyLevel for TodoListLevel {
    fn entity(&self) -> Entity {
        Entity::TodoList
    }

    async fn sync_children(
        &self,
        ctx: &SyncContext,
        parent: &Node,
    ) -> Result<LevelOutcome, AppError> {
        let Payload::TodoSet(set) = &parent.payload else {
            return Ok(LevelOutcome::default());
        };
        let Some(url) = &set.todolists_url else {
            return Ok(LevelOutcome::default());
        };

        let raw = ctx.api.fetch_all(url, parent.cursor).await?;
        let lists: Vec<TodoListDto> = decode_all("todolist", raw);
        let batch = sync_parent_batch(ctx, lists, TodoList::top_level).await?;
        Ok(batch.into_outcome(Payload::TodoList))
    }
}

/// Groups inside a top-level list. Keeps the parent lists in the frontier so the todo
/// level visits both.
pub struct NestedTodoListLevel;

#[async_trait]
impl HierarchyLevel for NestedTodoListLevel {
    fn entity(&self) -> Entity {
        Entity::TodoList
    }

    fn retains_parents(&self) -> bool {
        true
    }

    async fn sync_children(
        &self,
        ctx: &SyncContext,
        parent: &Node,
    ) -> Result<LevelOutcome, AppError> {
        let Payload::TodoList(list) = &parent.payload else {
            return Ok(LevelOutcome::default());
        };
        let Some(url) = &list.groups_url else {
            return Ok(LevelOutcome::default());
        };

        let raw = ctx.api.fetch_all(url, parent.cursor).await?;
        let groups: Vec<TodoListDto> = decode_all("todolist group", raw);
        let batch = sync_parent_batch(ctx, groups, TodoList::nested).await?;
        Ok(batch.into_outcome(Payload::TodoList))
    }
}

/// Leaf of the todo tree. Scoped by the list's own `todos_<listId>` checkpoint rather
/// than the list cursor, and fetches open and completed todos.
pub struct TodoLevel;

#[async_trait]
impl HierarchyLevel for TodoLevel {
    fn entity(&self) -> Entity {
        Entity::Todo
    }

    async fn sync_children(
        &self,
        ctx: &SyncContext,
        parent: &Node,
    ) -> Result<LevelOutcome, AppError> {
        let Payload::TodoList(list) = &parent.payload else {
            return Ok(LevelOutcome::default());
        };
        let Some(url) = &list.todos_url else {
            return Ok(LevelOutcome::default());
        };

        let resource = format!("todos_{}", list.id);
        let since = sync_state::get_last_sync(ctx.db(), &resource).await?;
        let started = Utc::now();

        let mut raw = ctx.api.fetch_all(url, since).await?;
        raw.extend(
            ctx.api
                .fetch_all(&with_query(url, "completed=true"), since)
                .await?,
        );

        let todos: Vec<TodoDto> = decode_all("todo", raw);
        let batch = sync_batch(ctx, todos, |dto| Todo::from(dto)).await?;

        let assignees: Vec<(i64, Vec<i64>)> = batch
            .stale
            .iter()
            .map(|stale| (stale.item.id, ids(&stale.item.assignees)))
            .collect();
        ctx.engine
            .replace_relations(TODO_ASSIGNEES, &assignees)
            .await?;

        sync_state::set_last_sync(ctx.db(), &resource, started).await?;

        Ok(LevelOutcome {
            written: batch.written,
            ..LevelOutcome::default()
        })
    }
}

pub struct CardTableLevel;

#[async_trait]
impl HierarchyLevel for CardTableLevel {
    fn entity(&self) -> Entity {
        Entity::CardTable
    }

    async fn sync_children(
        &self,
        ctx: &SyncContext,
        parent: &Node,
    ) -> Result<LevelOutcome, AppError> {
        let Payload::Project(project) = &parent.payload else {
            return Ok(LevelOutcome::default());
        };

        let mut raw = Vec::new();
        for url in project.dock_urls("kanban_board") {
            raw.extend(ctx.api.fetch_all(&url, parent.cursor).await?);
        }

        let tables: Vec<CardTableDto> = decode_all("card table", raw);
        let batch = sync_parent_batch(ctx, tables, |dto| CardTable::from(dto)).await?;
        Ok(batch.into_outcome(Payload::CardTable))
    }
}

pub struct CardColumnLevel;

#[async_trait]
impl HierarchyLevel for CardColumnLevel {
    fn entity(&self) -> Entity {
        Entity::CardColumn
    }

    async fn sync_children(
        &self,
        ctx: &SyncContext,
        parent: &Node,
    ) -> Result<LevelOutcome, AppError> {
        let Payload::CardTable(table) = &parent.payload else {
            return Ok(LevelOutcome::default());
        };

        let mut raw = Vec::new();
        for column in &table.lists {
            match &column.url {
                Some(url) => raw.extend(ctx.api.fetch_all(url, parent.cursor).await?),
                None => debug!("column {} of card table {} has no url", column.id, table.id),
            }
        }

        let columns: Vec<CardColumnDto> = decode_all("card column", raw);
        let batch = sync_parent_batch(ctx, columns, |dto| CardColumn::from(dto)).await?;
        Ok(batch.into_outcome(Payload::CardColumn))
    }
}

pub struct CardLevel;

#[async_trait]
impl HierarchyLevel for CardLevel {
    fn entity(&self) -> Entity {
        Entity::Card
    }

    async fn sync_children(
        &self,
        ctx: &SyncContext,
        parent: &Node,
    ) -> Result<LevelOutcome, AppError> {
        let Payload::CardColumn(column) = &parent.payload else {
            return Ok(LevelOutcome::default());
        };
        let Some(url) = &column.cards_url else {
            return Ok(LevelOutcome::default());
        };

        let raw = ctx.api.fetch_all(url, parent.cursor).await?;
        let cards: Vec<CardDto> = decode_all("card", raw);
        let batch = sync_parent_batch(ctx, cards, |dto| Card::from(dto)).await?;

        let assignees: Vec<(i64, Vec<i64>)> = batch
            .stale
            .iter()
            .map(|stale| (stale.item.id, ids(&stale.item.assignees)))
            .collect();
        ctx.engine
            .replace_relations(CARD_ASSIGNEES, &assignees)
            .await?;

        Ok(batch.into_outcome(Payload::Card))
    }
}

/// Steps only come with the full card payload, one request per stale card.
pub struct CardStepLevel;

#[async_trait]
impl HierarchyLevel for CardStepLevel {
    fn entity(&self) -> Entity {
        Entity::CardStep
    }

    async fn sync_children(
        &self,
        ctx: &SyncContext,
        parent: &Node,
    ) -> Result<LevelOutcome, AppError> {
        let Payload::Card(card) = &parent.payload else {
            return Ok(LevelOutcome::default());
        };

        let Some(raw) = ctx.api.fetch_one(&card.detail_path()).await? else {
            debug!("card {} is gone upstream", card.id);
            return Ok(LevelOutcome::default());
        };
        let detail: CardDetailDto = match decode("card detail", raw) {
            Ok(detail) => detail,
            Err(e) => {
                warn!("Card {} left unsynced: {}", card.id, e);
                return Ok(LevelOutcome::incomplete());
            }
        };

        let steps: Vec<CardStepDto> = decode_all("card step", detail.steps);
        let card_id = card.id;
        let batch = sync_batch(ctx, steps, |dto| CardStep::from_dto(card_id, dto)).await?;

        let assignees: Vec<(i64, Vec<i64>)> = batch
            .stale
            .iter()
            .map(|stale| (stale.item.id, ids(&stale.item.assignees)))
            .collect();
        ctx.engine
            .replace_relations(CARD_STEP_ASSIGNEES, &assignees)
            .await?;

        Ok(LevelOutcome {
            written: batch.written,
            ..LevelOutcome::default()
        })
    }
}

/// Apply completion and reopen events from the project's todo recordings feed to todos
/// already mirrored locally. Only a recording whose flag disagrees with the stored todo
/// is applied, so content edits merged by the todo walk are left alone. Returns the
/// number of todos updated.
pub async fn sync_todo_completions(ctx: &SyncContext, project_id: i64) -> Result<u64, AppError> {
    let resource = format!("todo_recordings_{}", project_id);
    let since = sync_state::get_last_sync(ctx.db(), &resource).await?;
    let started = Utc::now();

    let path = format!("projects/recordings.json?type=Todo&bucket={}", project_id);
    let raw = ctx.api.fetch_all(&path, since).await?;
    let recordings: Vec<TodoRecordingDto> = decode_all("todo recording", raw);

    let recording_ids: Vec<i64> = recordings.iter().map(|r| r.id).collect();
    let current = repository::snapshot_todo_completion(ctx.db(), &recording_ids).await?;

    let changes: Vec<(i64, bool, DateTime<Utc>)> = recordings
        .iter()
        .filter_map(|recording| {
            let (_, stored_completed) = current.get(&recording.id)?;
            (*stored_completed != recording.completed).then_some((
                recording.id,
                recording.completed,
                recording.effective_at(),
            ))
        })
        .collect();

    let updated = if changes.is_empty() {
        0
    } else {
        repository::apply_todo_completions(ctx.db(), &changes).await?
    };

    sync_state::set_last_sync(ctx.db(), &resource, started).await?;
    debug!("project {}: {} completion changes applied", project_id, updated);
    Ok(updated)
}
