use mailsmith_core::config::{AppConfig, LoadOptions};
use mailsmith_db::{connect, migrations};
use serde_json::json;

use crate::commands::{runtime, CommandResult};

const MANAGED_TABLES: [&str; 2] = ["email_document", "conversation_message"];

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    let runtime = match runtime("migrate") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let mut present = Vec::new();
        for table in MANAGED_TABLES {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
            if count == 1 {
                present.push(table);
            }
        }
        pool.close().await;
        Ok::<Vec<&'static str>, (&'static str, String, u8)>(present)
    });

    match result {
        Ok(tables) => CommandResult::success_with_data(
            "migrate",
            format!("applied pending migrations to `{}`", config.database.url),
            Some(json!({ "tables": tables })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
