use chapterhouse::{
    api::{routes, AppState},
    cli::{commands, Cli, Commands},
    config::Settings,
    db,
    indexer::SearchIndex,
    publisher::PublishScheduler,
    Error, Result,
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chapterhouse=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let settings = Settings::from_env()?;
    settings.validate()?;

    match cli.command {
        Commands::Serve { port, host } => serve(settings, port, host).await?,
        Commands::Migrate => migrate(settings).await?,
        Commands::PublishDue => {
            let pool = open_database(&settings).await?;
            let report = commands::publish_due(&pool).await?;
            commands::print_publish_report(&report);
        }
        Commands::Reindex => {
            let pool = open_database(&settings).await?;
            let index = SearchIndex::new(&settings.search.index_path)?;
            let indexed = commands::reindex(&pool, &index).await?;
            println!("\u{2713} Indexed {indexed} public stories");
        }
        Commands::Promote { username } => {
            let pool = open_database(&settings).await?;
            commands::promote(&pool, &username).await?;
            println!("\u{2713} {username} is now an admin");
        }
        Commands::Stats => {
            let stats = commands::stats(&server_url(&settings)).await?;
            commands::print_stats(&stats);
        }
        Commands::Search { query, page } => {
            let results = commands::search(&server_url(&settings), &query, page).await?;
            commands::print_search_results(&results);
        }
    }

    Ok(())
}

fn server_url(settings: &Settings) -> String {
    settings
        .server
        .external_url
        .clone()
        .unwrap_or_else(|| format!("http://{}:{}", settings.server.host, settings.server.port))
}

async fn open_database(settings: &Settings) -> Result<db::DbPool> {
    let pool = db::init_pool_with_config(&settings.database).await?;
    db::run_migrations(&pool).await?;
    Ok(pool)
}

async fn serve(mut settings: Settings, port: Option<u16>, host: Option<String>) -> Result<()> {
    // Override settings with CLI arguments
    if let Some(port) = port {
        settings.server.port = port;
    }
    if let Some(host) = host {
        settings.server.host = host;
    }

    info!("Starting Chapterhouse server");
    info!("Database: {}", settings.database.url);
    info!("Server: {}:{}", settings.server.host, settings.server.port);

    let pool = db::init_pool_with_config(&settings.database).await?;
    info!(
        "Database connection established (max_connections: {}, min_connections: {})",
        settings.database.max_connections, settings.database.min_connections
    );

    db::run_migrations(&pool).await?;
    info!("Database migrations completed");

    let search_index = Arc::new(SearchIndex::new(&settings.search.index_path)?);
    info!(
        "Search index initialized at {:?} ({} documents)",
        settings.search.index_path,
        search_index.num_docs()
    );

    let state = AppState::new(pool, settings.clone(), search_index);

    // Background publication ticker
    let scheduler = Arc::new(PublishScheduler::new(
        state.publisher.clone(),
        settings.publisher.interval_seconds,
    ));
    let scheduler_handle = scheduler.start();

    let app = routes::create_router(state, &settings);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| Error::Internal(format!("Server error: {e}")))?;

    scheduler_handle.abort();
    info!("Shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn migrate(settings: Settings) -> Result<()> {
    info!("Running database migrations");

    let pool = db::init_pool(&settings.database.url).await?;
    db::run_migrations(&pool).await?;

    println!("\u{2713} Database migrations completed successfully");
    Ok(())
}
