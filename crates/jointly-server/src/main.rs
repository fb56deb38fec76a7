mod cleanup;
mod config;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use jointly_api::{AppState, AppStateInner, build_router};
use jointly_assets::export::{CardFont, PdfCardRenderer, QrCodePng};
use jointly_assets::{Exporter, Storage};
use jointly_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "jointly=debug,jointly_api=debug,jointly_assets=debug,tower_http=debug".into()
            }),
        )
        .init();

    // Config
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    // Init DB and storage
    let db = Arc::new(Database::open(&config.db_path)?);
    let storage = Arc::new(Storage::new(config.uploads_dir.clone()).await?);

    // Background orphan sweep
    match config.sweep_interval {
        Some(every) => {
            tokio::spawn(cleanup::run_cleanup_loop(db.clone(), storage.clone(), every, config.sweep_grace));
            info!("Orphan sweep every {}s (grace {}s)", every.as_secs(), config.sweep_grace.as_secs());
        }
        None => info!("Orphan sweep disabled"),
    }

    let mut inner = AppStateInner::new(db, storage, config.jwt_secret.clone());
    inner.public_url = config.public_url.clone();
    inner.max_body_bytes = config.max_body_bytes;
    if let Some(path) = &config.card_font {
        let bytes = std::fs::read(path).with_context(|| format!("reading card font {}", path.display()))?;
        let font = CardFont::from_bytes(bytes)?;
        inner.exporter = Exporter::with_renderers(
            inner.db.clone(),
            inner.storage.clone(),
            Arc::new(QrCodePng),
            Arc::new(PdfCardRenderer::with_fallback(font)),
        );
        info!("Access cards fall back to {}", path.display());
    }
    let state: AppState = Arc::new(inner);

    let app = build_router(state);

    let addr = config.addr()?;
    info!("Jointly server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
