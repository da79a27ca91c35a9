mod common;

use basecamp_cache::db::{repository, sync_state};
use basecamp_cache::error::AppError;
use basecamp_cache::sync::progress::Progress;
use basecamp_cache::sync::staleness::normalize;
use serde_json::json;
use sqlx::SqlitePool;
use tokio::sync::mpsc;

use common::{FakeBasecamp, World, count, hours_from_now, pool, publish, service, stamp};

async fn todo_state(pool: &SqlitePool, id: i64) -> (String, bool) {
    sqlx::query_as("SELECT content, completed FROM todos WHERE id = ?1")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("todo row")
}

fn drain(mut rx: mpsc::Receiver<Progress>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(progress) = rx.try_recv() {
        lines.push(progress.to_string());
    }
    lines
}

#[tokio::test]
async fn test_first_pass_mirrors_both_trees() {
    let pool = pool().await;
    let fake = FakeBasecamp::new();
    let t1 = hours_from_now(-24);
    let world = World::new(1, "Website", t1);
    publish(&fake, &[&world]);

    let stats = service(&pool, &fake).sync_all().await.expect("sync pass");

    assert_eq!(stats.projects_fetched, 1);
    assert_eq!(stats.projects_synced, 1);
    // Placeholder insert plus the final write.
    assert_eq!(stats.projects, 2);
    assert_eq!(stats.todosets, 1);
    assert_eq!(stats.todolists, 2);
    assert_eq!(stats.todos, 3);
    assert_eq!(stats.card_tables, 1);
    assert_eq!(stats.card_columns, 1);
    assert_eq!(stats.cards, 1);
    assert_eq!(stats.card_steps, 1);
    assert_eq!(stats.completions, 0);

    assert_eq!(fake.since_of("projects.json"), Some(None));
    assert_eq!(count(&pool, "todo_assignees").await, 4);
    assert_eq!(count(&pool, "card_assignees").await, 1);
    assert_eq!(count(&pool, "card_step_assignees").await, 1);

    let projects = repository::fetch_projects(&pool).await.unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].updated_at.map(normalize), Some(normalize(t1)));

    assert_eq!(
        sync_state::get_last_sync(&pool, "projects").await.unwrap(),
        Some(normalize(t1))
    );
    for resource in ["cards", "todos", "todos_100", "todos_101", "todo_recordings_1"] {
        assert!(
            sync_state::get_last_sync(&pool, resource).await.unwrap().is_some(),
            "missing checkpoint {}",
            resource
        );
    }

    let tasks = repository::fetch_assigned_tasks(&pool, 7).await.unwrap();
    let summary: Vec<(&str, i64)> = tasks.iter().map(|t| (t.task_type.as_str(), t.id)).collect();
    assert_eq!(
        summary,
        vec![("todo", 1001), ("card_step", 1900), ("card", 1500), ("todo", 1000)]
    );
}

#[tokio::test]
async fn test_second_pass_without_changes_writes_nothing() {
    let pool = pool().await;
    let fake = FakeBasecamp::new();
    let world = World::new(1, "Website", hours_from_now(-24));
    publish(&fake, &[&world]);
    let service = service(&pool, &fake);

    service.sync_all().await.expect("first pass");
    fake.clear_calls();
    let stats = service.sync_all().await.expect("second pass");

    assert_eq!(stats.rows_written(), 0);
    assert_eq!(stats.projects_fetched, 1);
    assert_eq!(stats.projects_synced, 0);
    let paths: Vec<String> = fake.calls().into_iter().map(|c| c.path).collect();
    assert_eq!(paths, vec!["projects.json".to_string()]);
}

#[tokio::test]
async fn test_single_update_only_walks_changed_branch() {
    let pool = pool().await;
    let fake = FakeBasecamp::new();
    let t1 = hours_from_now(-24);
    let t2 = hours_from_now(1);
    let mut world = World::new(1, "Website", t1);
    publish(&fake, &[&world]);
    let service = service(&pool, &fake);
    service.sync_all().await.expect("first pass");
    let list_checkpoint = sync_state::get_last_sync(&pool, "todos_100").await.unwrap();

    world.edit_open_todo(t2, "Write launch post");
    publish(&fake, &[&world]);
    fake.clear_calls();
    let stats = service.sync_all().await.expect("second pass");

    assert_eq!(fake.since_of("projects.json"), Some(Some(normalize(t1))));
    assert_eq!(stats.projects_synced, 1);
    assert_eq!(stats.todosets, 1);
    assert_eq!(stats.todolists, 1);
    assert_eq!(stats.todos, 1);
    assert_eq!(stats.card_tables, 0);
    assert_eq!(stats.card_columns, 0);
    assert_eq!(stats.projects, 1);
    assert_eq!(stats.rows_written(), 4);

    // Unchanged branches are never descended into.
    assert!(fake.fetched(&world.card_table_path()));
    assert!(!fake.fetched(&world.column_path()));
    assert!(!fake.fetched(&world.group_todos_path()));
    assert_eq!(fake.since_of(&world.list_todos_path()), Some(list_checkpoint));

    assert_eq!(
        todo_state(&pool, world.open_todo_id()).await,
        ("Write launch post".to_string(), false)
    );
    assert_eq!(
        sync_state::get_last_sync(&pool, "projects").await.unwrap(),
        Some(normalize(t2))
    );
}

#[tokio::test]
async fn test_unseen_project_is_walked_in_full() {
    let pool = pool().await;
    let fake = FakeBasecamp::new();
    let website = World::new(1, "Website", hours_from_now(-24));
    publish(&fake, &[&website]);
    let service = service(&pool, &fake);
    service.sync_all().await.expect("first pass");

    // Children are older than the projects checkpoint; only the project moved.
    let mut mobile = World::new(2, "Mobile", hours_from_now(-48));
    mobile.touch_project(hours_from_now(-1));
    publish(&fake, &[&website, &mobile]);
    fake.clear_calls();
    let stats = service.sync_all().await.expect("second pass");

    assert_eq!(stats.projects_fetched, 2);
    assert_eq!(stats.projects_synced, 1);
    assert_eq!(stats.todolists, 2);
    assert_eq!(stats.todos, 3);
    assert_eq!(stats.cards, 1);
    assert_eq!(stats.card_steps, 1);
    assert_eq!(fake.since_of(&mobile.groups_path()), Some(None));
    assert!(!fake.fetched(&website.column_path()));
    assert_eq!(count(&pool, "projects").await, 2);
}

#[tokio::test]
async fn test_stale_projects_run_oldest_first() {
    let pool = pool().await;
    let fake = FakeBasecamp::new();
    let recent = hours_from_now(-10);
    let alpha = World::new(1, "Alpha", recent);
    let beta = World::new(2, "Beta", hours_from_now(-20));
    publish(&fake, &[&alpha, &beta]);

    let (tx, rx) = mpsc::channel(64);
    service(&pool, &fake)
        .sync_with_progress(tx)
        .await
        .expect("sync pass");

    let lines = drain(rx);
    assert_eq!(lines[0], "PROGRESS_TOTAL:4");
    assert_eq!(lines[1], "Syncing project 'Beta'");
    assert!(lines.contains(&"Syncing project 'Alpha'".to_string()));
    assert_eq!(
        sync_state::get_last_sync(&pool, "projects").await.unwrap(),
        Some(normalize(recent))
    );
}

#[tokio::test]
async fn test_progress_sequence() {
    let pool = pool().await;
    let fake = FakeBasecamp::new();
    let world = World::new(1, "Website", hours_from_now(-24));
    publish(&fake, &[&world]);

    let (tx, rx) = mpsc::channel(64);
    service(&pool, &fake)
        .sync_with_progress(tx)
        .await
        .expect("sync pass");

    assert_eq!(
        drain(rx),
        vec![
            "PROGRESS_TOTAL:2",
            "Syncing project 'Website'",
            "  Syncing cards hierarchy...",
            "PROGRESS_STEP:1",
            "  Syncing todos hierarchy...",
            "PROGRESS_STEP:1",
            "Project 'Website' updated.",
            "All done!",
        ]
    );
}

#[tokio::test]
async fn test_nothing_stale_still_reports_total_and_done() {
    let pool = pool().await;
    let fake = FakeBasecamp::new();
    fake.set_list("projects.json", Vec::new());

    let (tx, rx) = mpsc::channel(8);
    service(&pool, &fake)
        .sync_with_progress(tx)
        .await
        .expect("sync pass");

    assert_eq!(drain(rx), vec!["PROGRESS_TOTAL:0", "All done!"]);
}

#[tokio::test]
async fn test_interrupted_pass_resumes_without_rewalking_mirrored_trees() {
    let pool = pool().await;
    let fake = FakeBasecamp::new();
    let world = World::new(1, "Website", hours_from_now(-24));
    publish(&fake, &[&world]);
    let service = service(&pool, &fake);

    // Fails right after both trees have committed.
    fake.fail_on(&world.recordings_path());
    let result = service.sync_all().await;
    assert!(matches!(result, Err(AppError::Http { .. })));

    assert_eq!(count(&pool, "card_steps").await, 1);
    assert_eq!(count(&pool, "todos").await, 3);
    let projects = repository::fetch_projects(&pool).await.unwrap();
    assert_eq!(projects[0].updated_at, None);
    assert_eq!(sync_state::get_last_sync(&pool, "projects").await.unwrap(), None);
    assert!(sync_state::get_last_sync(&pool, "cards").await.unwrap().is_some());

    fake.clear_failures();
    fake.clear_calls();
    let stats = service.sync_all().await.expect("resumed pass");

    assert_eq!(stats.projects_synced, 1);
    assert_eq!(stats.card_tables, 0);
    assert_eq!(stats.todolists, 0);
    assert_eq!(stats.todos, 0);
    assert!(!fake.fetched(&world.column_path()));
    assert!(!fake.fetched(&world.card_detail_path()));
    assert!(!fake.fetched(&world.list_todos_path()));
    assert!(fake.fetched(&world.recordings_path()));
    assert!(sync_state::get_last_sync(&pool, "projects").await.unwrap().is_some());
}

#[tokio::test]
async fn test_failure_inside_todo_tree_is_rewalked_on_resume() {
    let pool = pool().await;
    let fake = FakeBasecamp::new();
    let world = World::new(1, "Website", hours_from_now(-24));
    publish(&fake, &[&world]);
    let service = service(&pool, &fake);

    // Lists are merged, then their todos fail to load.
    fake.fail_on(&world.list_todos_path());
    let result = service.sync_all().await;
    assert!(matches!(result, Err(AppError::Http { .. })));

    assert_eq!(count(&pool, "todolists").await, 2);
    assert_eq!(count(&pool, "todos").await, 0);
    let stored = repository::snapshot_timestamps(&pool, "todolists", &[world.list_id()])
        .await
        .unwrap();
    assert_eq!(stored[&world.list_id()], None);
    assert_eq!(sync_state::get_last_sync(&pool, "projects").await.unwrap(), None);

    fake.clear_failures();
    fake.clear_calls();
    let stats = service.sync_all().await.expect("resumed pass");

    assert_eq!(stats.projects_synced, 1);
    assert_eq!(stats.todosets, 1);
    assert_eq!(stats.todolists, 2);
    assert_eq!(stats.todos, 3);
    assert_eq!(stats.card_tables, 0);
    assert!(fake.fetched(&world.list_todos_path()));
    assert!(!fake.fetched(&world.column_path()));
    assert_eq!(count(&pool, "todos").await, 3);
    assert!(sync_state::get_last_sync(&pool, "projects").await.unwrap().is_some());
}

#[tokio::test]
async fn test_unreadable_card_detail_leaves_project_stale() {
    let pool = pool().await;
    let fake = FakeBasecamp::new();
    let mut world = World::new(1, "Website", hours_from_now(-24));
    let steps = world.card_detail["steps"].clone();
    world.card_detail["steps"] = json!("not a list");
    publish(&fake, &[&world]);
    let service = service(&pool, &fake);

    let (tx, rx) = mpsc::channel(64);
    let stats = service.sync_with_progress(tx).await.expect("first pass");

    assert_eq!(stats.projects_synced, 0);
    assert_eq!(stats.cards, 1);
    assert_eq!(stats.card_steps, 0);
    assert_eq!(stats.todos, 3);
    let lines = drain(rx);
    assert!(lines.contains(&"Project 'Website' left incomplete.".to_string()));
    assert!(!lines.contains(&"Project 'Website' updated.".to_string()));
    let projects = repository::fetch_projects(&pool).await.unwrap();
    assert_eq!(projects[0].updated_at, None);
    assert_eq!(sync_state::get_last_sync(&pool, "projects").await.unwrap(), None);

    world.card_detail["steps"] = steps;
    publish(&fake, &[&world]);
    fake.clear_calls();
    let stats = service.sync_all().await.expect("second pass");

    assert_eq!(stats.projects_synced, 1);
    assert_eq!(stats.card_steps, 1);
    assert_eq!(stats.todolists, 0);
    assert!(fake.fetched(&world.card_detail_path()));
    assert_eq!(count(&pool, "card_steps").await, 1);
}

#[tokio::test]
async fn test_incomplete_project_holds_projects_checkpoint() {
    let pool = pool().await;
    let fake = FakeBasecamp::new();
    let alpha = World::new(1, "Alpha", hours_from_now(-10));
    let mut beta = World::new(2, "Beta", hours_from_now(-20));
    beta.card_detail["steps"] = json!("not a list");
    publish(&fake, &[&alpha, &beta]);
    let service = service(&pool, &fake);

    let stats = service.sync_all().await.expect("sync pass");

    // Alpha is mirrored, but the checkpoint must not move past Beta.
    assert_eq!(stats.projects_synced, 1);
    assert_eq!(sync_state::get_last_sync(&pool, "projects").await.unwrap(), None);
    let projects = repository::fetch_projects(&pool).await.unwrap();
    let alpha_row = projects.iter().find(|p| p.id == 1).expect("alpha row");
    assert!(alpha_row.updated_at.is_some());

    fake.clear_calls();
    service.sync_all().await.expect("second pass");
    assert_eq!(fake.since_of("projects.json"), Some(None));
    assert!(fake.fetched(&beta.card_detail_path()));
    assert!(!fake.fetched(&alpha.card_detail_path()));
}

#[tokio::test]
async fn test_failure_is_streamed_as_terminal_line() {
    let pool = pool().await;
    let fake = FakeBasecamp::new();
    fake.fail_on("projects.json");

    let (tx, rx) = mpsc::channel(8);
    service(&pool, &fake).report(tx).await;

    let lines = drain(rx);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("SYNC_ERROR:"));
    assert!(lines[0].contains("500"));
}

#[tokio::test]
async fn test_closed_receiver_cancels_before_any_checkpoint() {
    let pool = pool().await;
    let fake = FakeBasecamp::new();
    let world = World::new(1, "Website", hours_from_now(-24));
    publish(&fake, &[&world]);

    let (tx, rx) = mpsc::channel(8);
    drop(rx);
    let result = service(&pool, &fake).sync_with_progress(tx).await;

    assert!(matches!(result, Err(AppError::Cancelled)));
    assert_eq!(sync_state::get_last_sync(&pool, "projects").await.unwrap(), None);
    assert_eq!(count(&pool, "todosets").await, 0);
}

#[tokio::test]
async fn test_completion_events_flip_existing_todos() {
    let pool = pool().await;
    let fake = FakeBasecamp::new();
    let mut world = World::new(1, "Website", hours_from_now(-24));
    publish(&fake, &[&world]);
    let service = service(&pool, &fake);
    service.sync_all().await.expect("first pass");

    let t2 = hours_from_now(1);
    world.recordings = vec![
        json!({
            "id": 1000,
            "updated_at": stamp(t2),
            "completed": true,
            "completion": { "created_at": stamp(t2) }
        }),
        json!({ "id": 1002, "updated_at": stamp(t2), "completed": false }),
        json!({ "id": 99999, "updated_at": stamp(t2), "completed": true }),
    ];
    world.touch_project(t2);
    publish(&fake, &[&world]);
    let stats = service.sync_all().await.expect("second pass");

    assert_eq!(stats.completions, 2);
    assert_eq!(stats.todos, 0);
    assert!(todo_state(&pool, 1000).await.1);
    assert!(!todo_state(&pool, 1002).await.1);
    assert_eq!(count(&pool, "todos").await, 3);

    let tasks = repository::fetch_assigned_tasks(&pool, 7).await.unwrap();
    let ids: Vec<i64> = tasks.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![1002, 1001, 1900, 1500]);

    // The same events again change nothing.
    world.touch_project(hours_from_now(2));
    publish(&fake, &[&world]);
    let stats = service.sync_all().await.expect("third pass");
    assert_eq!(stats.completions, 0);
}

#[tokio::test]
async fn test_malformed_entity_is_skipped_not_fatal() {
    let pool = pool().await;
    let fake = FakeBasecamp::new();
    let mut world = World::new(1, "Website", hours_from_now(-24));
    world
        .open_todos
        .push(json!({ "id": 5555, "content": "no parent, no timestamp" }));
    publish(&fake, &[&world]);

    let stats = service(&pool, &fake).sync_all().await.expect("sync pass");

    assert_eq!(stats.todos, 3);
    assert_eq!(count(&pool, "todos").await, 3);
}

#[tokio::test]
async fn test_content_edit_with_recording_keeps_new_content() {
    let pool = pool().await;
    let fake = FakeBasecamp::new();
    let mut world = World::new(1, "Website", hours_from_now(-24));
    publish(&fake, &[&world]);
    let service = service(&pool, &fake);
    service.sync_all().await.expect("first pass");

    // The feed lists every touched todo, not only completion changes.
    let t2 = hours_from_now(1);
    world.edit_open_todo(t2, "Renamed");
    world.recordings = vec![json!({
        "id": world.open_todo_id(),
        "updated_at": stamp(t2),
        "completed": false
    })];
    publish(&fake, &[&world]);
    let stats = service.sync_all().await.expect("second pass");

    assert_eq!(stats.todos, 1);
    assert_eq!(stats.completions, 0);
    assert_eq!(
        todo_state(&pool, world.open_todo_id()).await,
        ("Renamed".to_string(), false)
    );
}
