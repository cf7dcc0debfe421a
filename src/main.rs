mod cascade;
mod cli;
mod config;
mod db;
mod error;
mod query;
mod resource;
mod slug;
mod types;
mod upsert;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::db::{schema, Database};
use crate::error::Result;
use crate::resource::Resource;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Argument errors exit here, before any datastore access.
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .with_writer(std::io::stderr)
        .init();

    let db = match Database::connect(&cfg).await {
        Ok(db) => db,
        Err(e) => {
            error!("Fatal error: {e}");
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
    };

    let result = run(&db, cli.command).await;
    db.close().await;

    match result {
        Ok(output) => println!("{output}"),
        Err(e) => {
            error!(code = e.exit_code(), "command failed: {e}");
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
    }
}

/// Execute one command and return what it prints.
async fn run(db: &Database, command: Command) -> Result<String> {
    match command {
        Command::Init => {
            let mut tx = db.begin_write().await?;
            let report = schema::create_schema(&mut tx).await?;
            tx.commit().await?;
            if report.created.is_empty() {
                Ok("The database schema is already up to date".to_string())
            } else {
                Ok(format!("Created: {}", report.created.join(", ")))
            }
        }
        Command::Create { kind, id, data } => {
            let id = id.unwrap_or_else(Uuid::new_v4);
            let outcome = Resource::new(db, kind).upsert_with_report(id, &data).await?;
            Ok(upserted_message(outcome.created, outcome.id))
        }
        Command::Update { kind, id, data } => {
            let outcome = Resource::new(db, kind).upsert_with_report(id, &data).await?;
            Ok(upserted_message(outcome.created, outcome.id))
        }
        Command::Delete { kind, id } => {
            Resource::new(db, kind).delete(id).await?;
            Ok("The resource has been successfully deleted".to_string())
        }
        Command::Search { kind, data } => {
            let records = Resource::new(db, kind).search(&data).await?;
            info!(entity = %kind, count = records.len(), "printing search results");
            Ok(serde_json::to_string_pretty(&records)?)
        }
    }
}

fn upserted_message(created: bool, id: Uuid) -> String {
    let verb = if created { "created" } else { "updated" };
    format!("A resource has been {verb} under the ID: {id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{empty_db, memory_db};
    use crate::error::AppError;
    use serde_json::json;

    #[tokio::test]
    async fn init_reports_then_is_a_no_op() {
        let db = empty_db().await;
        let first = run(&db, Command::Init).await.unwrap();
        assert!(first.starts_with("Created: eventtype"));
        let second = run(&db, Command::Init).await.unwrap();
        assert_eq!(second, "The database schema is already up to date");
    }

    #[tokio::test]
    async fn create_then_update_messages() {
        let db = memory_db().await;
        let id = Uuid::new_v4();
        let created = run(
            &db,
            Command::Create {
                kind: types::EntityKind::Sport,
                id: Some(id),
                data: json!({"name": "Golf", "display_name": "Golf", "order": 1}),
            },
        )
        .await
        .unwrap();
        assert_eq!(created, format!("A resource has been created under the ID: {id}"));

        let updated = run(
            &db,
            Command::Update { kind: types::EntityKind::Sport, id, data: json!({"is_active": true}) },
        )
        .await
        .unwrap();
        assert_eq!(updated, format!("A resource has been updated under the ID: {id}"));
    }

    #[tokio::test]
    async fn search_prints_a_json_array() {
        let db = memory_db().await;
        let output = run(&db, Command::Search { kind: types::EntityKind::Event, data: json!([]) })
            .await
            .unwrap();
        assert_eq!(output, "[]");
    }

    #[tokio::test]
    async fn delete_of_unknown_id_is_not_found() {
        let db = memory_db().await;
        let err = run(&db, Command::Delete { kind: types::EntityKind::Sport, id: Uuid::new_v4() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(err.exit_code(), 4);
    }
}
