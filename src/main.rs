use std::process;
use std::sync::Arc;

use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::net::TcpListener;
use tracing_subscriber::{
    fmt::{writer::BoxMakeWriter, Layer},
    layer::SubscriberExt,
    EnvFilter, Registry,
};

use seller_ledger::config::Config;
use seller_ledger::db::{memory::MemoryStore, postgres::PgStore, Store};
use seller_ledger::routes::{self, AppState};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            process::exit(1);
        }
    };

    // add tracing layer
    let file_appender = tracing_appender::rolling::never(".", &config.log_file);
    let (file_writer, _file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, _stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    // json into the log file, plain text on stdout
    let file_layer = Layer::new()
        .json()
        .with_writer(BoxMakeWriter::new(move || file_writer.clone()));
    let stdout_layer = Layer::new().with_writer(BoxMakeWriter::new(move || stdout_writer.clone()));

    let subscriber = Registry::default()
        .with(EnvFilter::from_default_env())
        .with(file_layer)
        .with(stdout_layer);

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Unable to set global subscriber: {err}");
        process::exit(1);
    }

    let store: Arc<dyn Store> = match config.database_url.as_deref() {
        Some(url) => match process_database(url, config.max_connection_pooling).await {
            Ok(pool) => {
                tracing::info!("Connected to database");
                Arc::new(PgStore::new(pool))
            }
            Err(err) => {
                tracing::error!("Failed to connect to database: {}", err);
                process::exit(1);
            }
        },
        None => {
            tracing::warn!("DATABASE_URL not set, keeping the ledger in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let listener = match TcpListener::bind(("0.0.0.0", config.port)).await {
        Ok(listener) => {
            tracing::info!("Listening on port: {}", config.port);
            listener
        }
        Err(err) => {
            tracing::error!("Failed to bind to port: {}", err);
            process::exit(1);
        }
    };

    let state = AppState::new(&config, store);

    let transfers = state.transfers.clone();
    let purge_every = config.rate_limit_window;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_every);
        loop {
            ticker.tick().await;
            transfers.purge_rate_limits();
        }
    });

    let router = routes::router(state);
    tracing::info!("Routes constructed successfully");

    // start the http service
    let http_service = axum::serve(listener, router);
    if let Err(err) = http_service.await {
        tracing::error!("Failed to start server: {}", err);
        process::exit(1);
    }
}

async fn process_database(url: &str, max_conn_pool: u32) -> Result<PgPool, String> {
    let db_pool = PgPoolOptions::new()
        .max_connections(max_conn_pool)
        .connect(url)
        .await
        .map_err(|err| format!("Failed to connect to database: {}", err))?;

    match sqlx::migrate!("./migrations").run(&db_pool).await {
        Ok(_) => {
            tracing::info!("Migrations run successfully");
        }
        Err(err) => {
            // an already migrated database is fine to continue with
            tracing::warn!("Failed to run migrations: {err}");
        }
    }

    Ok(db_pool)
}
