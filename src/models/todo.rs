use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::basecamp::dto::{TodoDto, TodoListDto, TodoSetDto};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TodoSet {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&TodoSetDto> for TodoSet {
    fn from(dto: &TodoSetDto) -> Self {
        Self {
            id: dto.id,
            project_id: dto.bucket.id,
            title: dto.title.clone(),
            updated_at: dto.updated_at,
        }
    }
}

/// Exactly one of `todoset_id` / `parent_list_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TodoList {
    pub id: i64,
    pub todoset_id: Option<i64>,
    pub parent_list_id: Option<i64>,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

impl TodoList {
    pub fn top_level(dto: &TodoListDto) -> Self {
        Self {
            id: dto.id,
            todoset_id: Some(dto.parent.id),
            parent_list_id: None,
            title: dto.title.clone(),
            updated_at: dto.updated_at,
        }
    }

    pub fn nested(dto: &TodoListDto) -> Self {
        Self {
            id: dto.id,
            todoset_id: None,
            parent_list_id: Some(dto.parent.id),
            title: dto.title.clone(),
            updated_at: dto.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Todo {
    pub id: i64,
    pub todolist_id: i64,
    pub content: String,
    pub app_url: String,
    pub due_on: Option<NaiveDate>,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&TodoDto> for Todo {
    fn from(dto: &TodoDto) -> Self {
        Self {
            id: dto.id,
            todolist_id: dto.parent.id,
            content: dto.content.clone(),
            app_url: dto.app_url.clone(),
            due_on: dto.due_on,
            completed: dto.completed,
            updated_at: dto.updated_at,
        }
    }
}
