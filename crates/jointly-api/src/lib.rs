pub mod auth;
pub mod dashboard;
pub mod error;
pub mod exports;
pub mod middleware;
pub mod public;
pub mod upload;

use std::sync::Arc;

use axum::http::{HeaderMap, header};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use jointly_assets::{EventGateway, Exporter, Ingest, Storage};
use jointly_db::Database;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub storage: Arc<Storage>,
    pub ingest: Ingest,
    pub gateway: EventGateway,
    pub exporter: Exporter,
    pub jwt_secret: String,
    /// Overrides the request-derived origin in access URLs.
    pub public_url: Option<String>,
    pub max_body_bytes: usize,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, storage: Arc<Storage>, jwt_secret: String) -> Self {
        Self {
            ingest: Ingest::new(db.clone(), storage.clone()),
            gateway: EventGateway::new(db.clone(), storage.clone()),
            exporter: Exporter::new(db.clone(), storage.clone()),
            db,
            storage,
            jwt_secret,
            public_url: None,
            max_body_bytes: 100 * 1024 * 1024,
        }
    }

    /// Origin guests reach this server under, without a trailing slash.
    pub fn origin(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.public_url {
            return url.trim_end_matches('/').to_string();
        }
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("http");
        format!("{}://{}", scheme, host)
    }
}

pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let public_routes = Router::new()
        .route("/Event/{token}", get(public::show_event))
        .route("/Event/{token}/media", post(public::upload_media))
        .route("/Event/{token}/messages", post(public::post_message))
        .route("/Event/{token}/voice-notes", post(public::upload_voice_note));

    let owner_routes = Router::new()
        .route("/dashboard/events", get(dashboard::list_events).post(dashboard::create_event))
        .route("/dashboard/events/{id}", get(dashboard::event_detail).post(dashboard::update_event))
        .route("/dashboard/events/{id}/deactivate", post(dashboard::deactivate_event))
        .route("/dashboard/events/{id}/delete", post(dashboard::purge_event))
        .route("/dashboard/media/{id}/delete", post(dashboard::delete_media))
        .route("/dashboard/messages/{id}/delete", post(dashboard::delete_message))
        .route("/dashboard/voice-notes/{id}/delete", post(dashboard::delete_voice_note))
        .route("/dashboard/events/{id}/media.zip", get(exports::media_archive))
        .route("/dashboard/events/{id}/voice-notes.zip", get(exports::voice_archive))
        .route("/dashboard/events/{id}/messages.txt", get(exports::transcript))
        .route("/dashboard/events/{id}/card.pdf", get(exports::access_card))
        .layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(auth_routes)
        .merge(public_routes)
        .merge(owner_routes)
        .route("/health", get(health))
        .nest_service("/uploads", ServeDir::new(state.storage.root()))
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
