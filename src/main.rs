use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cli;
mod config;
mod db;
mod models;
mod services;

use cli::{Cli, Commands};
use config::AppConfig;
use services::import::ImportService;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: AppConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "movie_catalog=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config_dir.as_deref());

    config
        .paths
        .ensure_dirs()
        .await
        .context("Failed to create application directories")?;

    let database_url = config.database_url();
    tracing::debug!("Database URL: {}", database_url);

    let pool = db::connect(&database_url).await?;
    db::migrate(&pool).await?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(pool, config).await,
        Commands::Import { url } => {
            let service = ImportService::new(pool, &config.import).await?;
            let outcome = service.import_from_url(&url).await?;
            println!(
                "{} \"{}\" ({}), cast: {}",
                if outcome.created { "Created" } else { "Updated" },
                outcome.movie.title,
                outcome.movie.id,
                outcome
                    .cast_count
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "unchanged".to_string())
            );
            Ok(())
        }
        Commands::Seed => {
            let summary = db::seed::seed(&pool).await?;
            println!(
                "Seeded: {} new movies (totals: {} movies, {} genres, {} actors)",
                summary.movies_created, summary.movies, summary.genres, summary.actors
            );
            Ok(())
        }
        Commands::SetToken { token, clear } => {
            let token = if clear { None } else { token };
            let settings = services::settings::set_api_token(&pool, token.as_deref()).await?;
            if settings.kinopoisk_api_token.is_some() {
                println!("Kinopoisk API token saved");
            } else {
                println!("Kinopoisk API token cleared");
            }
            Ok(())
        }
    }
}

async fn serve(pool: sqlx::SqlitePool, config: AppConfig) -> Result<()> {
    config.log_config();

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.bind_address))?;

    let state = Arc::new(AppState { db: pool, config });
    let app = api::router(state.clone());

    tracing::info!("Starting server on {}", addr);

    let shutdown_signal = async {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
            _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
        }
    };

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    state.db.close().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}
