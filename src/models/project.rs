use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::basecamp::dto::ProjectDto;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: i64,
    pub name: String,
    /// `None` while the project's subtree has not finished its first sync.
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&ProjectDto> for Project {
    fn from(dto: &ProjectDto) -> Self {
        Self {
            id: dto.id,
            name: dto.name.clone(),
            updated_at: Some(dto.updated_at),
        }
    }
}
