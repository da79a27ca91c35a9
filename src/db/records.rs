use chrono::{DateTime, Utc};
use sqlx::Sqlite;
use sqlx::query_builder::Separated;

use super::bulk::{Relation, UpsertRecord};
use crate::models::{Card, CardColumn, CardStep, CardTable, Project, Todo, TodoList, TodoSet};

pub const TODO_ASSIGNEES: Relation = Relation {
    table: "todo_assignees",
    parent_column: "todo_id",
};

pub const CARD_ASSIGNEES: Relation = Relation {
    table: "card_assignees",
    parent_column: "card_id",
};

pub const CARD_STEP_ASSIGNEES: Relation = Relation {
    table: "card_step_assignees",
    parent_column: "step_id",
};

impl UpsertRecord for Project {
    const TABLE: &'static str = "projects";
    const COLUMNS: &'static [&'static str] = &["id", "name", "updated_at"];

    fn id(&self) -> i64 {
        self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn push_row(&self, mut row: Separated<'_, '_, Sqlite, &'static str>) {
        row.push_bind(self.id)
            .push_bind(self.name.clone())
            .push_bind(self.updated_at);
    }
}

impl UpsertRecord for TodoSet {
    const TABLE: &'static str = "todosets";
    const COLUMNS: &'static [&'static str] = &["id", "project_id", "title", "updated_at"];

    fn id(&self) -> i64 {
        self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }

    fn push_row(&self, mut row: Separated<'_, '_, Sqlite, &'static str>) {
        row.push_bind(self.id)
            .push_bind(self.project_id)
            .push_bind(self.title.clone())
            .push_bind(self.updated_at);
    }
}

impl UpsertRecord for TodoList {
    const TABLE: &'static str = "todolists";
    const COLUMNS: &'static [&'static str] =
        &["id", "todoset_id", "parent_list_id", "title", "updated_at"];

    fn id(&self) -> i64 {
        self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }

    fn push_row(&self, mut row: Separated<'_, '_, Sqlite, &'static str>) {
        row.push_bind(self.id)
            .push_bind(self.todoset_id)
            .push_bind(self.parent_list_id)
            .push_bind(self.title.clone())
            .push_bind(self.updated_at);
    }
}

impl UpsertRecord for Todo {
    const TABLE: &'static str = "todos";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "todolist_id",
        "content",
        "app_url",
        "due_on",
        "completed",
        "updated_at",
    ];

    fn id(&self) -> i64 {
        self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }

    fn push_row(&self, mut row: Separated<'_, '_, Sqlite, &'static str>) {
        row.push_bind(self.id)
            .push_bind(self.todolist_id)
            .push_bind(self.content.clone())
            .push_bind(self.app_url.clone())
            .push_bind(self.due_on)
            .push_bind(self.completed)
            .push_bind(self.updated_at);
    }
}

impl UpsertRecord for CardTable {
    const TABLE: &'static str = "card_tables";
    const COLUMNS: &'static [&'static str] = &["id", "project_id", "title", "updated_at"];

    fn id(&self) -> i64 {
        self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }

    fn push_row(&self, mut row: Separated<'_, '_, Sqlite, &'static str>) {
        row.push_bind(self.id)
            .push_bind(self.project_id)
            .push_bind(self.title.clone())
            .push_bind(self.updated_at);
    }
}

impl UpsertRecord for CardColumn {
    const TABLE: &'static str = "card_columns";
    const COLUMNS: &'static [&'static str] = &["id", "cardtable_id", "title", "updated_at"];

    fn id(&self) -> i64 {
        self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }

    fn push_row(&self, mut row: Separated<'_, '_, Sqlite, &'static str>) {
        row.push_bind(self.id)
            .push_bind(self.cardtable_id)
            .push_bind(self.title.clone())
            .push_bind(self.updated_at);
    }
}

impl UpsertRecord for Card {
    const TABLE: &'static str = "cards";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "cardcolumn_id",
        "title",
        "due_on",
        "app_url",
        "completed",
        "updated_at",
    ];

    fn id(&self) -> i64 {
        self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }

    fn push_row(&self, mut row: Separated<'_, '_, Sqlite, &'static str>) {
        row.push_bind(self.id)
            .push_bind(self.cardcolumn_id)
            .push_bind(self.title.clone())
            .push_bind(self.due_on)
            .push_bind(self.app_url.clone())
            .push_bind(self.completed)
            .push_bind(self.updated_at);
    }
}

impl UpsertRecord for CardStep {
    const TABLE: &'static str = "card_steps";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "card_id",
        "title",
        "due_on",
        "app_url",
        "completed",
        "updated_at",
    ];

    fn id(&self) -> i64 {
        self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }

    fn push_row(&self, mut row: Separated<'_, '_, Sqlite, &'static str>) {
        row.push_bind(self.id)
            .push_bind(self.card_id)
            .push_bind(self.title.clone())
            .push_bind(self.due_on)
            .push_bind(self.app_url.clone())
            .push_bind(self.completed)
            .push_bind(self.updated_at);
    }
}
