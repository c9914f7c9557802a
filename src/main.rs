use billing_sync::{
    api::HttpBillingSource,
    config::{
        AppConfig,
        database::{create_connection, create_tables},
    },
    core::{SyncEngine, SyncMode},
    errors::Result,
    logging, scheduler,
};
use clap::Parser;
use dotenvy::dotenv;
use std::{env, path::PathBuf};
use tracing::{error, info, warn};

/// Synchronizes billing API data into a database.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Perform one full sync and exit instead of running the scheduler
    #[arg(long)]
    run_once: bool,

    /// TOML file with `[sync]` settings (overrides `SYNC_CONFIG`)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load .env file first, it may carry the log level
    let dotenv_loaded = dotenv().is_ok();

    // 2. Initialize tracing on the console and the rotating log file
    let _log_guard = logging::init(&|name: &str| env::var(name).ok());
    info!(dotenv_loaded, "Starting billing sync");

    // 3. Load configuration; any problem here is fatal
    let config = AppConfig::from_env(cli.config.as_deref())
        .inspect_err(|e| error!("Invalid configuration: {}", e))?;

    // 4. Connect to the database and make sure the tables exist
    let db = create_connection(&config.database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    create_tables(&db)
        .await
        .inspect(|()| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Build the API client and the engine
    let source = HttpBillingSource::new(&config.api, config.sync.request_timeout())?;
    let interval = config.interval;
    let engine = SyncEngine::new(source, db, config.sync);

    // 6. Run once or on schedule
    if cli.run_once {
        let outcome = engine.run(SyncMode::Full).await;
        if !outcome.is_clean() {
            warn!("Sync finished with failures; they will be retried on the next run");
        }
    } else {
        scheduler::run_scheduled(&engine, interval, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    }

    Ok(())
}
