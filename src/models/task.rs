use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An open, dated work item assigned to someone: a todo, a card or a card step.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AssignedTask {
    pub task_type: String,
    pub id: i64,
    pub title: String,
    pub project_name: String,
    pub due_on: NaiveDate,
    pub app_url: String,
}
