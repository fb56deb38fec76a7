use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use jointly_db::Database;
use jointly_types::models::{AssetKind, MediaKind};
use tracing::{info, warn};

use crate::blocking;
use crate::error::{AssetError, AssetResult};
use crate::storage::{Storage, Target, sanitize_file_name};

/// 10 MB per media file
pub const MAX_MEDIA_BYTES: usize = 10 * 1024 * 1024;
/// 5 MB per voice note
pub const MAX_VOICE_BYTES: usize = 5 * 1024 * 1024;
pub const MEDIA_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "mp4", "mov"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov"];
pub const VOICE_EXTENSIONS: &[&str] = &["webm", "mp3", "wav", "ogg", "m4a"];
pub const MAX_MESSAGE_CHARS: usize = 1000;
pub const MAX_CONTRIBUTOR_CHARS: usize = 100;

/// One file as received from a client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
}

/// Result of a batch media upload. Partial success is still success.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub success_count: usize,
    /// `"{file name}: {reason}"` per rejected item.
    pub failures: Vec<String>,
}

/// Lower-cased extension of a client file name, without the dot.
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Check size then extension of one media file and derive its kind.
pub fn classify_media(file: &UploadedFile) -> Result<MediaKind, String> {
    if file.data.is_empty() {
        return Err("file is empty".to_string());
    }
    if file.data.len() > MAX_MEDIA_BYTES {
        return Err("file must be 10 MB or smaller".to_string());
    }
    let ext = extension_of(&file.file_name).unwrap_or_default();
    if !MEDIA_EXTENSIONS.contains(&ext.as_str()) {
        return Err("only image and video files can be uploaded".to_string());
    }
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Ok(MediaKind::Video)
    } else {
        Ok(MediaKind::Image)
    }
}

pub fn check_voice_note(file: &UploadedFile) -> Result<(), String> {
    if file.data.is_empty() {
        return Err("recording is empty".to_string());
    }
    if file.data.len() > MAX_VOICE_BYTES {
        return Err("recording must be 5 MB or smaller".to_string());
    }
    let ext = extension_of(&file.file_name).unwrap_or_default();
    if !VOICE_EXTENSIONS.contains(&ext.as_str()) {
        return Err("unsupported audio format".to_string());
    }
    Ok(())
}

/// Untrusted display name: trimmed, blank becomes absent, capped in length.
pub fn normalize_contributor(name: Option<&str>) -> Option<String> {
    let trimmed = name?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_CONTRIBUTOR_CHARS).collect())
}

/// Accepts anonymous guest contributions for an event.
#[derive(Clone)]
pub struct Ingest {
    db: Arc<Database>,
    storage: Arc<Storage>,
}

impl Ingest {
    pub fn new(db: Arc<Database>, storage: Arc<Storage>) -> Self {
        Self { db, storage }
    }

    async fn require_event(&self, event_id: i64) -> AssetResult<()> {
        let db = self.db.clone();
        blocking(move || db.find_event_by_id(event_id))
            .await?
            .map(|_| ())
            .ok_or(AssetError::NotFound)
    }

    /// Store every acceptable file; rejected files are reported, not fatal.
    pub async fn ingest_media(
        &self,
        event_id: i64,
        files: Vec<UploadedFile>,
        contributor: Option<&str>,
    ) -> AssetResult<IngestReport> {
        self.require_event(event_id).await?;
        if files.is_empty() {
            return Err(AssetError::validation("select at least one file"));
        }

        let contributor = normalize_contributor(contributor);
        let mut report = IngestReport::default();

        for file in &files {
            match self.store_media(event_id, file, contributor.clone()).await {
                Ok(_) => report.success_count += 1,
                Err(e) => {
                    warn!("Event {}: media {:?} rejected: {}", event_id, file.file_name, e);
                    report
                        .failures
                        .push(format!("{}: {}", file.file_name, e.public_reason()));
                }
            }
        }

        info!(
            "Event {}: {} media stored, {} rejected",
            event_id,
            report.success_count,
            report.failures.len()
        );
        Ok(report)
    }

    async fn store_media(
        &self,
        event_id: i64,
        file: &UploadedFile,
        contributor: Option<String>,
    ) -> AssetResult<i64> {
        let kind = classify_media(file).map_err(AssetError::Validation)?;
        let staged = self
            .storage
            .write_staged(
                Target::Asset { event_id, kind: AssetKind::Media },
                &file.file_name,
                &file.data,
            )
            .await
            .map_err(|e| AssetError::StorageWrite(e.to_string()))?;

        let db = self.db.clone();
        let original_name = sanitize_file_name(&file.file_name);
        // Commit and persist run together on the blocking pool, so a dropped
        // request cannot leave a row without its file.
        blocking(move || {
            let id = db.insert_media(
                event_id,
                staged.reference(),
                &original_name,
                kind,
                contributor.as_deref(),
                Utc::now(),
            )?;
            staged.persist();
            Ok(id)
        })
        .await
    }

    pub async fn ingest_message(
        &self,
        event_id: i64,
        text: &str,
        contributor: Option<&str>,
    ) -> AssetResult<i64> {
        self.require_event(event_id).await?;

        let body = text.trim();
        if body.is_empty() {
            return Err(AssetError::validation("message cannot be empty"));
        }
        if body.chars().count() > MAX_MESSAGE_CHARS {
            return Err(AssetError::validation("message must be 1000 characters or fewer"));
        }

        let db = self.db.clone();
        let body = body.to_string();
        let contributor = normalize_contributor(contributor);
        let id = blocking(move || db.insert_message(event_id, &body, contributor.as_deref(), Utc::now()))
            .await?;
        info!("Event {}: message {} stored", event_id, id);
        Ok(id)
    }

    pub async fn ingest_voice_note(
        &self,
        event_id: i64,
        audio: UploadedFile,
        contributor: Option<&str>,
        duration_secs: i64,
    ) -> AssetResult<i64> {
        self.require_event(event_id).await?;
        check_voice_note(&audio).map_err(AssetError::Validation)?;
        if duration_secs < 0 {
            return Err(AssetError::validation("duration cannot be negative"));
        }

        let staged = self
            .storage
            .write_staged(
                Target::Asset { event_id, kind: AssetKind::Voice },
                &audio.file_name,
                &audio.data,
            )
            .await
            .map_err(|e| AssetError::StorageWrite(e.to_string()))?;

        let db = self.db.clone();
        let contributor = normalize_contributor(contributor);
        let id = blocking(move || {
            let id = db.insert_voice_note(
                event_id,
                staged.reference(),
                contributor.as_deref(),
                duration_secs,
                Utc::now(),
            )?;
            staged.persist();
            Ok(id)
        })
        .await?;
        info!("Event {}: voice note {} stored", event_id, id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use jointly_db::models::{MediaRow, MessageRow, VoiceNoteRow};

    use super::*;
    use crate::test_support::{fields, file, harness, user};

    async fn event(h: &crate::test_support::Harness) -> i64 {
        let owner = user(&h.db, "host@example.com");
        h.db.insert_event(owner, &fields("Wedding"), None, "INGESTTOKEN00001", Utc::now())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn media_size_boundary() {
        assert_eq!(classify_media(&file("exact.jpg", MAX_MEDIA_BYTES)), Ok(MediaKind::Image));
        assert!(classify_media(&file("over.jpg", MAX_MEDIA_BYTES + 1)).is_err());
    }

    #[test]
    fn media_extension_decides_kind() {
        assert_eq!(classify_media(&file("clip.MOV", 10)), Ok(MediaKind::Video));
        assert_eq!(classify_media(&file("clip.mp4", 10)), Ok(MediaKind::Video));
        assert_eq!(classify_media(&file("photo.JPeG", 10)), Ok(MediaKind::Image));
        assert!(classify_media(&file("notes.pdf", 10)).is_err());
        assert!(classify_media(&file("noext", 10)).is_err());
    }

    #[test]
    fn contributor_names_are_trimmed_and_capped() {
        assert_eq!(normalize_contributor(None), None);
        assert_eq!(normalize_contributor(Some("   ")), None);
        assert_eq!(normalize_contributor(Some("  Elif ")).as_deref(), Some("Elif"));
        assert_eq!(
            normalize_contributor(Some(&"x".repeat(150))).unwrap().chars().count(),
            MAX_CONTRIBUTOR_CHARS
        );
    }

    #[tokio::test]
    async fn unknown_event_writes_nothing() {
        let h = harness().await;
        let ingest = Ingest::new(h.db.clone(), h.storage.clone());

        let err = ingest
            .ingest_media(404, vec![file("a.jpg", 10)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::NotFound));
        assert!(h.storage.list_files().unwrap().is_empty());

        assert!(matches!(
            ingest.ingest_message(404, "hi", None).await,
            Err(AssetError::NotFound)
        ));
    }

    #[tokio::test]
    async fn batch_upload_is_partial_success() {
        let h = harness().await;
        let event_id = event(&h).await;
        let ingest = Ingest::new(h.db.clone(), h.storage.clone());

        let report = ingest
            .ingest_media(
                event_id,
                vec![
                    file("one.jpg", 100),
                    file("huge.mp4", MAX_MEDIA_BYTES + 1),
                    file("two.png", 100),
                ],
                Some("Cem"),
            )
            .await
            .unwrap();

        assert_eq!(report.success_count, 2);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].starts_with("huge.mp4: "));

        let rows = h.db.assets_for_event::<MediaRow>(event_id).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].original_name, "one.jpg");
        assert_eq!(rows[0].uploaded_by.as_deref(), Some("Cem"));
        assert!(rows[0].is_approved);
        for row in &rows {
            assert!(h.storage.resolve(&row.storage_ref).unwrap().is_file());
        }
        assert_eq!(h.storage.list_files().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let h = harness().await;
        let event_id = event(&h).await;
        let ingest = Ingest::new(h.db.clone(), h.storage.clone());
        assert!(matches!(
            ingest.ingest_media(event_id, vec![], None).await,
            Err(AssetError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let h = harness().await;
        let event_id = event(&h).await;
        let ingest = Ingest::new(h.db.clone(), h.storage.clone());

        assert!(matches!(
            ingest.ingest_message(event_id, " \n\t ", None).await,
            Err(AssetError::Validation(_))
        ));
        assert!(matches!(
            ingest.ingest_message(event_id, &"a".repeat(1001), None).await,
            Err(AssetError::Validation(_))
        ));

        ingest.ingest_message(event_id, "  congratulations!  ", Some(" ")).await.unwrap();
        let rows = h.db.assets_for_event::<MessageRow>(event_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].body, "congratulations!");
        assert_eq!(rows[0].sender_name, None);
    }

    #[tokio::test]
    async fn voice_note_validation() {
        let h = harness().await;
        let event_id = event(&h).await;
        let ingest = Ingest::new(h.db.clone(), h.storage.clone());

        for (name, len) in [("a.webm", MAX_VOICE_BYTES + 1), ("a.flac", 10), ("a.mp3", 0)] {
            let err = ingest
                .ingest_voice_note(event_id, file(name, len), None, 3)
                .await
                .unwrap_err();
            assert!(matches!(err, AssetError::Validation(_)), "{name} should be rejected");
        }
        assert!(matches!(
            ingest.ingest_voice_note(event_id, file("a.ogg", 10), None, -1).await,
            Err(AssetError::Validation(_))
        ));
        assert!(h.storage.list_files().unwrap().is_empty());

        ingest
            .ingest_voice_note(event_id, file("note.M4A", MAX_VOICE_BYTES), Some("Ali"), 12)
            .await
            .unwrap();
        let rows = h.db.assets_for_event::<VoiceNoteRow>(event_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].duration_secs, 12);
        assert!(rows[0].storage_ref.starts_with(&format!("events/{}/voice/", event_id)));
    }
}
