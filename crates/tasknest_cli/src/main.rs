//! CLI smoke entry point.
//!
//! # Responsibility
//! - Wire the core against a SQLite file and run one create/update/delete
//!   cycle through the auto-save pipeline.
//! - Print metrics so the pipeline can be checked without a UI.
//!
//! Usage: `tasknest_cli [db_path] [config.json]`

use log::error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tasknest_core::{
    core_version, init_logging_from_config, CoreConfig, NotificationSource, SaveOutcome,
    SqliteKvGateway, TaskDraft, TaskFilter, TaskService, TaskServiceDeps, TaskStatus,
};
use tokio::sync::broadcast::Receiver;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err}");
            eprintln!("tasknest_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let db_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("tasknest.sqlite3"));
    let config = match args.next() {
        Some(path) => CoreConfig::from_json_file(path)?,
        None => CoreConfig::default(),
    };

    if let Ok(log_dir) = std::env::var("TASKNEST_LOG_DIR") {
        init_logging_from_config(&config, log_dir)?;
    }

    println!("tasknest_core version={}", core_version());
    let gateway = Arc::new(SqliteKvGateway::open(&db_path)?);
    let storage_key = config.storage_key.clone();
    let mut deps = TaskServiceDeps::new(gateway.clone());
    deps.config = config;
    let service = TaskService::open(deps).await?;
    let _monitor = service.spawn_failure_monitor();
    let mut outcomes = service.engine().subscribe_outcomes();

    let task = service.create_task(TaskDraft::new("try tasknest"), NotificationSource::Manual)?;
    wait_settled(&mut outcomes).await;
    service.change_status(&task.id, TaskStatus::Done, NotificationSource::Manual)?;
    wait_settled(&mut outcomes).await;

    let listed = service.list_tasks(&TaskFilter::default());
    println!("tasks={} stats={:?}", listed.len(), service.stats());

    service.delete_task(&task.id, NotificationSource::Auto)?;
    wait_settled(&mut outcomes).await;

    let durable = service.engine().force_sync().await?;
    println!("durable_tasks={}", durable.len());
    println!("metrics={:?}", service.engine().metrics());
    println!("writes={}", gateway.write_count(&storage_key)?);
    println!("notifications={}", service.notifications().count());
    Ok(())
}

async fn wait_settled(outcomes: &mut Receiver<SaveOutcome>) {
    while let Ok(outcome) = outcomes.recv().await {
        if outcome.is_settled() {
            println!("save {} -> {:?}", outcome.operation_id, outcome.status);
            return;
        }
    }
}
