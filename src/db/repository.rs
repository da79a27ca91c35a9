use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::models::{AssignedTask, Project};

/// Bound on the number of ids in one `IN (...)` list.
const SNAPSHOT_CHUNK: usize = 500;

/// Stored `updated_at` for each of `ids` present in `table`. Ids with no row are absent
/// from the map; rows with a NULL timestamp map to `None`.
pub async fn snapshot_timestamps(
    db: &SqlitePool,
    table: &str,
    ids: &[i64],
) -> Result<HashMap<i64, Option<DateTime<Utc>>>, sqlx::Error> {
    let mut snapshot = HashMap::with_capacity(ids.len());

    for chunk in ids.chunks(SNAPSHOT_CHUNK) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT id, updated_at FROM {table} WHERE id IN ("));
        let mut separated = qb.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows: Vec<(i64, Option<DateTime<Utc>>)> =
            qb.build_query_as().fetch_all(db).await?;
        snapshot.extend(rows);
    }

    Ok(snapshot)
}

/// Insert a project with no timestamp so children have a valid parent key. Leaves an
/// existing row untouched. Returns whether a row was inserted.
pub async fn insert_project_placeholder(
    db: &SqlitePool,
    id: i64,
    name: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO projects (id, name, updated_at)
        VALUES (?1, ?2, NULL)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(name)
    .execute(db)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Current `(updated_at, completed)` of the todos among `ids` that exist locally.
pub async fn snapshot_todo_completion(
    db: &SqlitePool,
    ids: &[i64],
) -> Result<HashMap<i64, (DateTime<Utc>, bool)>, sqlx::Error> {
    let mut snapshot = HashMap::with_capacity(ids.len());

    for chunk in ids.chunks(SNAPSHOT_CHUNK) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, updated_at, completed FROM todos WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows: Vec<(i64, DateTime<Utc>, bool)> = qb.build_query_as().fetch_all(db).await?;
        snapshot.extend(rows.into_iter().map(|(id, at, done)| (id, (at, done))));
    }

    Ok(snapshot)
}

/// Flip the completed flag and timestamp of existing todos. One transaction.
pub async fn apply_todo_completions(
    db: &SqlitePool,
    changes: &[(i64, bool, DateTime<Utc>)],
) -> Result<u64, sqlx::Error> {
    let mut tx = db.begin().await?;
    let mut updated = 0;

    for (id, completed, updated_at) in changes {
        updated += sqlx::query("UPDATE todos SET completed = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(*completed)
            .bind(*updated_at)
            .bind(*id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }

    tx.commit().await?;
    Ok(updated)
}

pub async fn fetch_projects(db: &SqlitePool) -> Result<Vec<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        r#"
        SELECT id, name, updated_at
        FROM projects
        ORDER BY name, id
        "#,
    )
    .fetch_all(db)
    .await
}

/// Open, dated todos, cards and card steps assigned to `assignee_id`, soonest first.
pub async fn fetch_assigned_tasks(
    db: &SqlitePool,
    assignee_id: i64,
) -> Result<Vec<AssignedTask>, sqlx::Error> {
    sqlx::query_as::<_, AssignedTask>(
        r#"
        SELECT 'todo' AS task_type, t.id AS id, t.content AS title,
               p.name AS project_name, t.due_on AS due_on, t.app_url AS app_url
        FROM todos t
        JOIN todo_assignees ta ON ta.todo_id = t.id
        JOIN todolists l ON l.id = t.todolist_id
        LEFT JOIN todolists pl ON pl.id = l.parent_list_id
        JOIN todosets s ON s.id = COALESCE(l.todoset_id, pl.todoset_id)
        JOIN projects p ON p.id = s.project_id
        WHERE ta.assignee_id = ? AND t.completed = 0 AND t.due_on IS NOT NULL

        UNION ALL

        SELECT 'card', c.id, c.title, p.name, c.due_on, c.app_url
        FROM cards c
        JOIN card_assignees ca ON ca.card_id = c.id
        JOIN card_columns col ON col.id = c.cardcolumn_id
        JOIN card_tables ct ON ct.id = col.cardtable_id
        JOIN projects p ON p.id = ct.project_id
        WHERE ca.assignee_id = ? AND c.completed = 0 AND c.due_on IS NOT NULL

        UNION ALL

        SELECT 'card_step', st.id, st.title, p.name, st.due_on, st.app_url
        FROM card_steps st
        JOIN card_step_assignees sa ON sa.step_id = st.id
        JOIN cards c ON c.id = st.card_id
        JOIN card_columns col ON col.id = c.cardcolumn_id
        JOIN card_tables ct ON ct.id = col.cardtable_id
        JOIN projects p ON p.id = ct.project_id
        WHERE sa.assignee_id = ? AND st.completed = 0 AND st.due_on IS NOT NULL

        ORDER BY due_on, task_type, id
        "#,
    )
    .bind(assignee_id)
    .bind(assignee_id)
    .bind(assignee_id)
    .fetch_all(db)
    .await
}
