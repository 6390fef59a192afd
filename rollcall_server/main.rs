use clap::Parser;
use futures::StreamExt;
use std::sync::Arc;

use rollcall_app::{
    config::Config,
    cqrs::{QueryHandler, queries::GetUsers},
    queries_handlers::GetUsersHandler,
};
use rollcall_db::{PostgresUnitOfWorkProvider, establish_connection_pool};
use rollcall_types::{Result, common::UserRow, errors::ApplicationError};

mod logs;
use logs::setup_logging;

/// Look up users by id and print them as JSON lines.
#[derive(Debug, Parser)]
#[command(name = "rollcall", version, about)]
struct Args {
    /// Print rows as they are fetched, keeping the transaction open meanwhile.
    #[arg(long)]
    stream: bool,

    /// User ids to look up.
    #[arg(required = true, num_args = 1..)]
    ids: Vec<String>,
}

#[tokio::main]
#[cfg(not(tarpaulin_include))]
async fn main() -> Result<(), ApplicationError> {
    let _log_guard = setup_logging();
    let args = Args::parse();

    let handler = setup_app().await?;
    let query = GetUsers::new(args.ids)?;

    if args.stream {
        let mut rows = handler.stream(&query).await?;
        while let Some(row) = rows.next().await {
            print_row(&row?)?;
        }
    } else {
        for row in handler.handle(&query).await? {
            print_row(&row)?;
        }
    }

    Ok(())
}

async fn setup_app() -> Result<GetUsersHandler, ApplicationError> {
    let config = Config::from_env();
    let db_pool = establish_connection_pool().await?;

    sqlx::migrate!("../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| ApplicationError::Infrastructure(format!("migrations failed: {e}")))?;

    let uow_provider =
        Arc::new(PostgresUnitOfWorkProvider::new(db_pool).with_fetch_size(config.fetch_size));
    tracing::info!(fetch_size = config.fetch_size, "Storage ready");

    Ok(GetUsersHandler::new(uow_provider))
}

fn print_row(row: &UserRow) -> Result<(), ApplicationError> {
    println!("{}", serde_json::to_string(row)?);
    Ok(())
}
