use std::sync::Arc;
use tasknest_core::{
    AutoSaveConfig, CoreConfig, NotificationSource, PersistenceGateway, SqliteKvGateway,
    TaskDraft, TaskFilter, TaskService, TaskServiceDeps, TaskStatus,
};

#[tokio::test]
async fn values_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasknest.db");

    let gateway = SqliteKvGateway::open(&path).unwrap();
    gateway
        .set_item("tasks", r#"[{"id":"a"}]"#.to_string())
        .await
        .unwrap();
    gateway.set_item("other", "[]".to_string()).await.unwrap();
    drop(gateway);

    let reopened = SqliteKvGateway::open(&path).unwrap();
    assert_eq!(
        reopened.get_item("tasks").await.unwrap().as_deref(),
        Some(r#"[{"id":"a"}]"#)
    );
    assert_eq!(reopened.write_count("tasks").unwrap(), 1);
    assert_eq!(reopened.get_item("missing").await.unwrap(), None);
}

#[tokio::test]
async fn service_state_is_durable_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasknest.db");
    let config = CoreConfig {
        autosave: AutoSaveConfig {
            debounce_ms: 50,
            ..AutoSaveConfig::default()
        },
        ..CoreConfig::default()
    };

    let gateway = Arc::new(SqliteKvGateway::open(&path).unwrap());
    let service = TaskService::open(TaskServiceDeps {
        config: config.clone(),
        ..TaskServiceDeps::new(gateway.clone())
    })
    .await
    .unwrap();
    let mut outcomes = service.engine().subscribe_outcomes();

    let created = service
        .create_task(TaskDraft::new("Persist me"), NotificationSource::Manual)
        .unwrap();
    service
        .change_status(&created.id, TaskStatus::InProgress, NotificationSource::Auto)
        .unwrap();
    loop {
        let outcome = outcomes.recv().await.unwrap();
        if outcome.is_settled() {
            assert!(outcome.failure().is_none());
            break;
        }
    }
    // Both edits collapse into one write.
    assert_eq!(gateway.write_count(&config.storage_key).unwrap(), 1);
    drop(service);

    let gateway = Arc::new(SqliteKvGateway::open(&path).unwrap());
    let reopened = TaskService::open(TaskServiceDeps {
        config,
        ..TaskServiceDeps::new(gateway)
    })
    .await
    .unwrap();
    let tasks = reopened.list_tasks(&TaskFilter::default());
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Persist me");
    assert_eq!(tasks[0].status, TaskStatus::InProgress);
}
