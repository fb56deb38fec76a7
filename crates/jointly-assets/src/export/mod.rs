pub mod archive;
pub mod card;
pub mod transcript;

use std::sync::Arc;

use jointly_db::models::{EventRow, MediaRow, MessageRow, VoiceNoteRow};
use jointly_db::{Database, OwnedAsset, queries, scoped};
use tracing::info;

use crate::blocking;
use crate::error::{AssetError, AssetResult};
use crate::storage::{Storage, sanitize_file_name};

pub use card::{CardFields, CardFont, CardRenderer, PdfCardRenderer, QrCodePng, QrRenderer};

/// A downloadable export.
#[derive(Debug)]
pub struct Artifact {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// `{Title_With_Underscores}{suffix}`
pub fn download_name(title: &str, suffix: &str) -> String {
    format!("{}{}", sanitize_file_name(&title.trim().replace(' ', "_")), suffix)
}

/// Public URL a guest opens to reach the event.
pub fn access_url(origin: &str, token: &str) -> String {
    format!("{}/Event/{}", origin.trim_end_matches('/'), token)
}

/// Read-only producers of downloadable artifacts.
///
/// Each export reads the event and its assets in one snapshot, so uploads
/// that land mid-export are simply absent from it.
#[derive(Clone)]
pub struct Exporter {
    db: Arc<Database>,
    storage: Arc<Storage>,
    qr: Arc<dyn QrRenderer>,
    card: Arc<dyn CardRenderer>,
}

impl Exporter {
    pub fn new(db: Arc<Database>, storage: Arc<Storage>) -> Self {
        Self::with_renderers(db, storage, Arc::new(QrCodePng), Arc::new(PdfCardRenderer::default()))
    }

    pub fn with_renderers(
        db: Arc<Database>,
        storage: Arc<Storage>,
        qr: Arc<dyn QrRenderer>,
        card: Arc<dyn CardRenderer>,
    ) -> Self {
        Self { db, storage, qr, card }
    }

    async fn snapshot<A: OwnedAsset>(&self, event_id: i64, owner_id: i64) -> AssetResult<(EventRow, Vec<A>)> {
        let db = self.db.clone();
        blocking(move || {
            db.with_snapshot(|conn| {
                let Some(event) = queries::event_for_owner(conn, event_id, owner_id)? else {
                    return Ok(None);
                };
                let assets = scoped::assets_for_event::<A>(conn, event.id)?;
                Ok(Some((event, assets)))
            })
        })
        .await?
        .ok_or(AssetError::NotFound)
    }

    pub async fn media_archive(&self, event_id: i64, owner_id: i64) -> AssetResult<Artifact> {
        let (event, media) = self.snapshot::<MediaRow>(event_id, owner_id).await?;
        let storage = self.storage.clone();
        let bytes = blocking(move || archive::build_zip(&archive::media_sources(&storage, &media))).await?;

        info!("Event {}: media archive built ({} bytes)", event_id, bytes.len());
        Ok(Artifact {
            file_name: download_name(&event.title, "_media.zip"),
            content_type: "application/zip",
            bytes,
        })
    }

    pub async fn voice_archive(&self, event_id: i64, owner_id: i64) -> AssetResult<Artifact> {
        let (event, notes) = self.snapshot::<VoiceNoteRow>(event_id, owner_id).await?;
        let storage = self.storage.clone();
        let bytes = blocking(move || archive::build_zip(&archive::voice_sources(&storage, &notes))).await?;

        info!("Event {}: voice note archive built ({} bytes)", event_id, bytes.len());
        Ok(Artifact {
            file_name: download_name(&event.title, "_voice_notes.zip"),
            content_type: "application/zip",
            bytes,
        })
    }

    pub async fn transcript(&self, event_id: i64, owner_id: i64) -> AssetResult<Artifact> {
        let (event, messages) = self.snapshot::<MessageRow>(event_id, owner_id).await?;
        let text = transcript::render_transcript(&event, &messages);

        Ok(Artifact {
            file_name: download_name(&event.title, "_messages.txt"),
            content_type: "text/plain; charset=utf-8",
            bytes: text.into_bytes(),
        })
    }

    /// Printable card pointing guests at `{origin}/Event/{token}`.
    pub async fn access_card(&self, event_id: i64, owner_id: i64, origin: &str) -> AssetResult<Artifact> {
        let db = self.db.clone();
        let event = blocking(move || db.find_event_for_owner(event_id, owner_id))
            .await?
            .ok_or(AssetError::NotFound)?;

        let url = access_url(origin, &event.access_token);
        let qr = self.qr.clone();
        let card = self.card.clone();
        let file_name = download_name(&event.title, "_Event_Card.pdf");
        let title = event.title;
        let event_date = event.event_date;
        let bytes = blocking(move || {
            let qr_png = qr.render_qr_png(&url)?;
            card.render_card_pdf(&CardFields {
                title,
                event_date,
                access_url: url,
                qr_png,
            })
        })
        .await?;

        Ok(Artifact {
            file_name,
            content_type: "application/pdf",
            bytes,
        })
    }

    /// PNG QR code of an arbitrary URL, for the owner's event page.
    pub async fn qr_png(&self, url: &str) -> AssetResult<Vec<u8>> {
        let qr = self.qr.clone();
        let url = url.to_string();
        blocking(move || qr.render_qr_png(&url)).await
    }
}
