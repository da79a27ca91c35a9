use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct Ref {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DockItem {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectDto {
    pub id: i64,
    pub name: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub dock: Vec<DockItem>,
}

impl ProjectDto {
    /// URLs of enabled dock tools with the given name (`todoset`, `kanban_board`).
    pub fn dock_urls(&self, name: &str) -> Vec<String> {
        self.dock
            .iter()
            .filter(|item| item.name == name && item.enabled)
            .filter_map(|item| item.url.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TodoSetDto {
    pub id: i64,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub bucket: Ref,
    #[serde(default)]
    pub todolists_url: Option<String>,
}

/// Both top-level lists (parent = todoset) and groups (parent = list) share this shape.
#[derive(Debug, Clone, Deserialize)]
pub struct TodoListDto {
    pub id: i64,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub parent: Ref,
    #[serde(default)]
    pub todos_url: Option<String>,
    #[serde(default)]
    pub groups_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TodoDto {
    pub id: i64,
    pub content: String,
    pub updated_at: DateTime<Utc>,
    pub parent: Ref,
    pub app_url: String,
    #[serde(default)]
    pub due_on: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub assignees: Vec<Ref>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnRef {
    pub id: i64,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardTableDto {
    pub id: i64,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub bucket: Ref,
    #[serde(default)]
    pub lists: Vec<ColumnRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardColumnDto {
    pub id: i64,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub parent: Ref,
    #[serde(default)]
    pub cards_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardDto {
    pub id: i64,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub parent: Ref,
    pub bucket: Ref,
    pub app_url: String,
    #[serde(default)]
    pub due_on: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub assignees: Vec<Ref>,
}

impl CardDto {
    pub fn detail_path(&self) -> String {
        format!(
            "buckets/{}/card_tables/cards/{}.json",
            self.bucket.id, self.id
        )
    }
}

/// The full card payload; only its steps are of interest.
#[derive(Debug, Clone, Deserialize)]
pub struct CardDetailDto {
    #[serde(default)]
    pub steps: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardStepDto {
    pub id: i64,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub app_url: String,
    #[serde(default)]
    pub due_on: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub assignees: Vec<Ref>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Completion {
    pub created_at: DateTime<Utc>,
}

/// An entry of the `recordings.json?type=Todo` activity feed.
#[derive(Debug, Clone, Deserialize)]
pub struct TodoRecordingDto {
    pub id: i64,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completion: Option<Completion>,
}

impl TodoRecordingDto {
    /// When the current completion state took effect.
    pub fn effective_at(&self) -> DateTime<Utc> {
        match (&self.completion, self.completed) {
            (Some(completion), true) => completion.created_at,
            _ => self.updated_at,
        }
    }
}

pub fn ids(refs: &[Ref]) -> Vec<i64> {
    refs.iter().map(|r| r.id).collect()
}

pub fn decode<T: DeserializeOwned>(kind: &str, raw: Value) -> Result<T, AppError> {
    let id = raw.get("id").cloned().unwrap_or(Value::Null);
    serde_json::from_value(raw)
        .map_err(|e| AppError::DataIntegrity(format!("{} {}: {}", kind, id, e)))
}

/// Decode every payload, dropping (and logging) the ones that don't fit.
pub fn decode_all<T: DeserializeOwned>(kind: &str, raw: Vec<Value>) -> Vec<T> {
    raw.into_iter()
        .filter_map(|item| match decode(kind, item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("Skipping {}", e);
                None
            }
        })
        .collect()
}
