#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use basecamp_cache::basecamp::BasecampApi;
use basecamp_cache::db;
use basecamp_cache::error::AppError;
use basecamp_cache::services::SyncService;
use basecamp_cache::sync::staleness::parse_timestamp;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{Value, json};
use sqlx::SqlitePool;

#[derive(Debug, Clone)]
pub struct Call {
    pub path: String,
    pub since: Option<DateTime<Utc>>,
}

enum Route {
    List(Vec<Value>),
    Object(Value),
}

/// In-memory Basecamp. List routes honour `since` the way `updated_since` does;
/// unknown paths behave like a 404 (empty list / absent object).
#[derive(Default)]
pub struct FakeBasecamp {
    routes: Mutex<HashMap<String, Route>>,
    failing: Mutex<Vec<String>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeBasecamp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_list(&self, path: &str, items: Vec<Value>) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Route::List(items));
    }

    pub fn set_object(&self, path: &str, value: Value) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Route::Object(value));
    }

    /// Make every request to `path` fail with a 500.
    pub fn fail_on(&self, path: &str) {
        self.failing.lock().unwrap().push(path.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn fetched(&self, path: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c.path == path)
    }

    /// The `since` of the first request to `path`, if it was requested.
    pub fn since_of(&self, path: &str) -> Option<Option<DateTime<Utc>>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.path == path)
            .map(|c| c.since)
    }

    fn record(&self, path: &str, since: Option<DateTime<Utc>>) -> Result<(), AppError> {
        self.calls.lock().unwrap().push(Call {
            path: path.to_string(),
            since,
        });
        if self.failing.lock().unwrap().iter().any(|p| p == path) {
            return Err(AppError::Http {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                url: path.to_string(),
            });
        }
        Ok(())
    }
}

fn updated_since(item: &Value, since: Option<DateTime<Utc>>) -> bool {
    let Some(since) = since else {
        return true;
    };
    match item
        .get("updated_at")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
    {
        Some(updated_at) => updated_at >= since,
        None => true,
    }
}

#[async_trait]
impl BasecampApi for FakeBasecamp {
    async fn fetch_all(
        &self,
        path: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Value>, AppError> {
        self.record(path, since)?;
        let routes = self.routes.lock().unwrap();
        Ok(match routes.get(path) {
            Some(Route::List(items)) => items
                .iter()
                .filter(|item| updated_since(item, since))
                .cloned()
                .collect(),
            Some(Route::Object(value)) => vec![value.clone()],
            None => Vec::new(),
        })
    }

    async fn fetch_one(&self, path: &str) -> Result<Option<Value>, AppError> {
        self.record(path, None)?;
        let routes = self.routes.lock().unwrap();
        Ok(match routes.get(path) {
            Some(Route::Object(value)) => Some(value.clone()),
            Some(Route::List(items)) => Some(Value::Array(items.clone())),
            None => None,
        })
    }
}

pub async fn pool() -> SqlitePool {
    db::memory_pool().await.expect("in-memory database")
}

pub fn service(pool: &SqlitePool, fake: &Arc<FakeBasecamp>) -> SyncService {
    SyncService::new(pool.clone(), fake.clone(), 100)
}

pub fn hours_from_now(hours: i64) -> DateTime<Utc> {
    Utc::now() + Duration::hours(hours)
}

pub fn stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One project with a full todo tree (a list, a nested group, open and completed
/// todos) and a full card tree (table, column, card, step). Ids derive from the
/// project id so several worlds can share one fake.
pub struct World {
    pub id: i64,
    pub project: Value,
    pub todoset: Value,
    pub lists: Vec<Value>,
    pub groups: Vec<Value>,
    pub open_todos: Vec<Value>,
    pub completed_todos: Vec<Value>,
    pub group_todos: Vec<Value>,
    pub card_table: Value,
    pub column: Value,
    pub cards: Vec<Value>,
    pub card_detail: Value,
    pub recordings: Vec<Value>,
}

impl World {
    pub fn new(id: i64, name: &str, at: DateTime<Utc>) -> Self {
        let ts = stamp(at);
        let (set, list, group) = (id * 10, id * 100, id * 100 + 1);
        let (table, column, card, step) = (id * 10 + 5, id * 100 + 50, id * 1000 + 500, id * 1000 + 900);

        let todo = |todo_id: i64, parent: i64, due: &str, completed: bool, assignees: &[i64]| {
            json!({
                "id": todo_id,
                "content": format!("Todo {}", todo_id),
                "updated_at": ts,
                "parent": { "id": parent },
                "app_url": format!("https://3.basecamp.com/999/buckets/{}/todos/{}", id, todo_id),
                "due_on": due,
                "completed": completed,
                "assignees": assignees.iter().map(|a| json!({ "id": a })).collect::<Vec<_>>(),
            })
        };

        Self {
            id,
            project: json!({
                "id": id,
                "name": name,
                "updated_at": ts,
                "dock": [
                    { "name": "todoset", "url": format!("buckets/{}/todosets/{}.json", id, set), "enabled": true },
                    { "name": "kanban_board", "url": format!("buckets/{}/card_tables/{}.json", id, table), "enabled": true },
                    { "name": "message_board", "url": format!("buckets/{}/message_boards/1.json", id), "enabled": true }
                ]
            }),
            todoset: json!({
                "id": set,
                "title": "To-dos",
                "updated_at": ts,
                "bucket": { "id": id },
                "todolists_url": format!("buckets/{}/todosets/{}/todolists.json", id, set)
            }),
            lists: vec![json!({
                "id": list,
                "title": "Launch",
                "updated_at": ts,
                "parent": { "id": set },
                "todos_url": format!("buckets/{}/todolists/{}/todos.json", id, list),
                "groups_url": format!("buckets/{}/todolists/{}/groups.json", id, list)
            })],
            groups: vec![json!({
                "id": group,
                "title": "Launch / copy",
                "updated_at": ts,
                "parent": { "id": list },
                "todos_url": format!("buckets/{}/todolists/{}/todos.json", id, group)
            })],
            open_todos: vec![todo(id * 1000, list, "2030-01-10", false, &[7])],
            completed_todos: vec![todo(id * 1000 + 2, list, "2030-01-01", true, &[7])],
            group_todos: vec![todo(id * 1000 + 1, group, "2030-01-05", false, &[7, 8])],
            card_table: json!({
                "id": table,
                "title": "Card Table",
                "updated_at": ts,
                "bucket": { "id": id },
                "lists": [
                    { "id": column, "url": format!("buckets/{}/card_tables/columns/{}.json", id, column) }
                ]
            }),
            column: json!({
                "id": column,
                "title": "Doing",
                "updated_at": ts,
                "parent": { "id": table },
                "cards_url": format!("buckets/{}/card_tables/lists/{}/cards.json", id, column)
            }),
            cards: vec![json!({
                "id": card,
                "title": "Hero image",
                "updated_at": ts,
                "parent": { "id": column },
                "bucket": { "id": id },
                "app_url": format!("https://3.basecamp.com/999/buckets/{}/card_tables/cards/{}", id, card),
                "due_on": "2030-01-07",
                "completed": false,
                "assignees": [{ "id": 7 }]
            })],
            card_detail: json!({
                "id": card,
                "title": "Hero image",
                "steps": [{
                    "id": step,
                    "title": "Pick a photo",
                    "updated_at": ts,
                    "app_url": format!("https://3.basecamp.com/999/buckets/{}/card_tables/steps/{}", id, step),
                    "due_on": "2030-01-06",
                    "completed": false,
                    "assignees": [{ "id": 7 }]
                }]
            }),
            recordings: Vec::new(),
        }
    }

    pub fn list_id(&self) -> i64 {
        self.id * 100
    }

    pub fn group_id(&self) -> i64 {
        self.id * 100 + 1
    }

    pub fn open_todo_id(&self) -> i64 {
        self.id * 1000
    }

    pub fn card_table_path(&self) -> String {
        format!("buckets/{}/card_tables/{}.json", self.id, self.id * 10 + 5)
    }

    pub fn column_path(&self) -> String {
        format!("buckets/{}/card_tables/columns/{}.json", self.id, self.id * 100 + 50)
    }

    pub fn list_todos_path(&self) -> String {
        format!("buckets/{}/todolists/{}/todos.json", self.id, self.list_id())
    }

    pub fn group_todos_path(&self) -> String {
        format!("buckets/{}/todolists/{}/todos.json", self.id, self.group_id())
    }

    pub fn groups_path(&self) -> String {
        format!("buckets/{}/todolists/{}/groups.json", self.id, self.list_id())
    }

    pub fn recordings_path(&self) -> String {
        format!("projects/recordings.json?type=Todo&bucket={}", self.id)
    }

    pub fn card_detail_path(&self) -> String {
        format!("buckets/{}/card_tables/cards/{}.json", self.id, self.id * 1000 + 500)
    }

    pub fn name(&self) -> String {
        self.project["name"].as_str().unwrap_or_default().to_string()
    }

    /// Edit the open todo at `at`, bumping its list, todoset and project the way
    /// Basecamp does.
    pub fn edit_open_todo(&mut self, at: DateTime<Utc>, content: &str) {
        let ts = stamp(at);
        self.open_todos[0]["content"] = json!(content);
        self.open_todos[0]["updated_at"] = json!(ts);
        self.lists[0]["updated_at"] = json!(ts);
        self.todoset["updated_at"] = json!(ts);
        self.project["updated_at"] = json!(ts);
    }

    pub fn touch_project(&mut self, at: DateTime<Utc>) {
        self.project["updated_at"] = json!(stamp(at));
    }

    /// Install every route of this world except `projects.json`.
    pub fn install(&self, fake: &FakeBasecamp) {
        let id = self.id;
        let set = id * 10;
        let table = id * 10 + 5;
        let column = id * 100 + 50;

        fake.set_object(&format!("buckets/{}/todosets/{}.json", id, set), self.todoset.clone());
        fake.set_list(
            &format!("buckets/{}/todosets/{}/todolists.json", id, set),
            self.lists.clone(),
        );
        fake.set_list(&self.groups_path(), self.groups.clone());
        fake.set_list(&self.list_todos_path(), self.open_todos.clone());
        fake.set_list(
            &format!("{}?completed=true", self.list_todos_path()),
            self.completed_todos.clone(),
        );
        fake.set_list(&self.group_todos_path(), self.group_todos.clone());
        fake.set_object(&format!("buckets/{}/card_tables/{}.json", id, table), self.card_table.clone());
        fake.set_object(&self.column_path(), self.column.clone());
        fake.set_list(
            &format!("buckets/{}/card_tables/lists/{}/cards.json", id, column),
            self.cards.clone(),
        );
        fake.set_object(&self.card_detail_path(), self.card_detail.clone());
        fake.set_list(&self.recordings_path(), self.recordings.clone());
    }
}

/// Install `worlds` and list their projects on `projects.json`.
pub fn publish(fake: &FakeBasecamp, worlds: &[&World]) {
    for world in worlds {
        world.install(fake);
    }
    fake.set_list(
        "projects.json",
        worlds.iter().map(|w| w.project.clone()).collect(),
    );
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("count query")
}
