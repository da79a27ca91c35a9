use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::basecamp::dto::{CardColumnDto, CardDto, CardStepDto, CardTableDto};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CardTable {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&CardTableDto> for CardTable {
    fn from(dto: &CardTableDto) -> Self {
        Self {
            id: dto.id,
            project_id: dto.bucket.id,
            title: dto.title.clone(),
            updated_at: dto.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CardColumn {
    pub id: i64,
    pub cardtable_id: i64,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&CardColumnDto> for CardColumn {
    fn from(dto: &CardColumnDto) -> Self {
        Self {
            id: dto.id,
            cardtable_id: dto.parent.id,
            title: dto.title.clone(),
            updated_at: dto.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Card {
    pub id: i64,
    pub cardcolumn_id: i64,
    pub title: String,
    pub due_on: Option<NaiveDate>,
    pub app_url: String,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&CardDto> for Card {
    fn from(dto: &CardDto) -> Self {
        Self {
            id: dto.id,
            cardcolumn_id: dto.parent.id,
            title: dto.title.clone(),
            due_on: dto.due_on,
            app_url: dto.app_url.clone(),
            completed: dto.completed,
            updated_at: dto.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CardStep {
    pub id: i64,
    pub card_id: i64,
    pub title: String,
    pub due_on: Option<NaiveDate>,
    pub app_url: String,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl CardStep {
    pub fn from_dto(card_id: i64, dto: &CardStepDto) -> Self {
        Self {
            id: dto.id,
            card_id,
            title: dto.title.clone(),
            due_on: dto.due_on,
            app_url: dto.app_url.clone(),
            completed: dto.completed,
            updated_at: dto.updated_at,
        }
    }
}
