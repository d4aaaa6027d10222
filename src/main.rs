use std::sync::Arc;

use bookshelf::config::{Cli, Config};
use bookshelf::db::{Database, LibsqlBookRepository};
use bookshelf::handler::AppState;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("bookshelf.svc starting");

    let cfg = Config::load(&args).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?args.config_path, "failed to load config");
        std::process::exit(1);
    });

    let db = Database::connect(&cfg.database).await.unwrap_or_else(|e| {
        tracing::error!(error = %format!("{e:#}"), "failed to setup database");
        std::process::exit(1);
    });
    let books = Arc::new(LibsqlBookRepository::new(db.connection().clone()));

    let app = bookshelf::app(AppState::new(books));

    let address = format!("0.0.0.0:{}", cfg.app.get_port());
    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    tracing::info!("bookshelf.svc running on {}", &address);
    if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        tracing::error!(error = %err, "server failed");
        std::process::exit(1);
    }

    tracing::info!("bookshelf.svc going off, graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install ctrl+c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("ctrl+c signal received, preparing to shutdown"),
        _ = terminate => tracing::info!("SIGTERM received, preparing to shutdown"),
    }
}
