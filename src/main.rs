//! mongo-nosql - command-line access to configured MongoDB databases.
//!
//! Resolves connection strings, draws and initializes sequence values and dumps
//! query results using the same configuration the library reads.

use bson::{Bson, Document};
use clap::Parser;
use mongo_nosql::config::{Command, Config, TomlSource};
use mongo_nosql::db::DatabasePool;
use mongo_nosql::error::{NosqlError, NosqlResult};
use mongodb::options::FindOptions;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // stdout carries command output, logs go to stderr
    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    init_tracing(&config);

    let source = TomlSource::from_path(&config.config)?;
    source.client_defaults().validate()?;

    info!(
        config = %config.config.display(),
        "Starting mongo-nosql v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool = DatabasePool::from_toml(source);
    let result = run(&pool, config.command).await;

    if let Err(e) = pool.close().await {
        error!(error = %e, "Failed to close connections");
    }

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        if let Some(suggestion) = e.suggestion() {
            eprintln!("hint: {}", suggestion);
        }
        return Err(e.into());
    }

    Ok(())
}

async fn run(pool: &DatabasePool, command: Command) -> NosqlResult<()> {
    match command {
        Command::Uri { name } => {
            let resolved = pool.resolve(&name)?;
            println!("{}", resolved.masked());
            println!("database: {}", resolved.database);
        }
        Command::Next {
            name,
            counter,
            count,
        } => {
            let db = pool.get(&name).await?;
            let value = if count == 1 {
                db.next_sequence(&counter).await?
            } else {
                db.next_sequence_range(&counter, count).await?
            };
            println!("{}", value);
        }
        Command::Init {
            name,
            counter,
            value,
        } => {
            let db = pool.get(&name).await?;
            db.init_sequence(&counter, value).await?;
        }
        Command::Find {
            name,
            collection,
            filter,
            limit,
        } => {
            let filter: Document = serde_json::from_str(&filter)
                .map_err(|e| NosqlError::invalid_input(format!("Invalid filter JSON: {}", e)))?;

            let mut options = FindOptions::default();
            options.limit = limit;

            let db = pool.get(&name).await?;
            let docs: Vec<Document> = db
                .collection::<Document>(&collection)
                .find_many(filter, options)
                .await
                .all()
                .await?;

            info!(collection = %collection, count = docs.len(), "Query finished");
            for doc in docs {
                println!("{}", Bson::Document(doc).into_relaxed_extjson());
            }
        }
    }
    Ok(())
}
