use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use jointly_db::models::{EventFields, EventRow, MediaRow, MessageRow, VoiceNoteRow};
use jointly_db::{Database, OwnedAsset, queries, scoped};
use tracing::{debug, info, warn};

use crate::blocking;
use crate::error::{AssetError, AssetResult};
use crate::ingest::{UploadedFile, extension_of};
use crate::storage::{Storage, Target};
use crate::token::generate_access_token;

/// 10 MB header image limit
pub const MAX_HEADER_BYTES: usize = 10 * 1024 * 1024;
pub const HEADER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];
const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 1000;
const MAX_LOCATION_CHARS: usize = 300;
const TOKEN_ATTEMPTS: usize = 5;

pub type TokenSource = Arc<dyn Fn() -> String + Send + Sync>;

/// Lifecycle of a stored event. A purged event has no state: its row is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Active,
    Inactive,
}

impl EventState {
    pub fn of(event: &EventRow) -> Self {
        if event.is_active { EventState::Active } else { EventState::Inactive }
    }

    /// State after applying `removal`, `None` once purged.
    pub fn after(self, removal: EventRemoval) -> Option<EventState> {
        match removal {
            EventRemoval::Deactivate => Some(EventState::Inactive),
            EventRemoval::Purge => None,
        }
    }
}

/// The two ways an owner can take an event down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRemoval {
    /// Flip the active flag; children and files stay.
    Deactivate,
    /// Remove rows, files and the storage tree.
    Purge,
}

/// An event with all of its assets, read in one snapshot.
#[derive(Debug)]
pub struct EventSnapshot {
    pub event: EventRow,
    pub media: Vec<MediaRow>,
    pub messages: Vec<MessageRow>,
    pub voice_notes: Vec<VoiceNoteRow>,
}

/// The only path through which an owner reads or changes an event.
///
/// Every call is scoped by `(event id, owner id)`. A wrong owner and a
/// missing event produce the same `NotFound`.
#[derive(Clone)]
pub struct EventGateway {
    db: Arc<Database>,
    storage: Arc<Storage>,
    token_source: TokenSource,
}

impl EventGateway {
    pub fn new(db: Arc<Database>, storage: Arc<Storage>) -> Self {
        Self::with_token_source(db, storage, Arc::new(generate_access_token))
    }

    pub fn with_token_source(db: Arc<Database>, storage: Arc<Storage>, token_source: TokenSource) -> Self {
        Self { db, storage, token_source }
    }

    pub async fn list_events(&self, owner_id: i64) -> AssetResult<Vec<EventRow>> {
        let db = self.db.clone();
        blocking(move || db.list_events_for_owner(owner_id)).await
    }

    pub async fn load_event(&self, event_id: i64, owner_id: i64) -> AssetResult<EventRow> {
        let db = self.db.clone();
        blocking(move || db.find_event_for_owner(event_id, owner_id))
            .await?
            .ok_or(AssetError::NotFound)
    }

    pub async fn event_detail(&self, event_id: i64, owner_id: i64) -> AssetResult<EventSnapshot> {
        let db = self.db.clone();
        blocking(move || {
            db.with_snapshot(|conn| {
                let Some(event) = queries::event_for_owner(conn, event_id, owner_id)? else {
                    return Ok(None);
                };
                Ok(Some(EventSnapshot {
                    media: scoped::assets_for_event(conn, event.id)?,
                    messages: scoped::assets_for_event(conn, event.id)?,
                    voice_notes: scoped::assets_for_event(conn, event.id)?,
                    event,
                }))
            })
        })
        .await?
        .ok_or(AssetError::NotFound)
    }

    /// Create an event. A header image is mandatory.
    pub async fn create_event(
        &self,
        owner_id: i64,
        fields: EventFields,
        header: Option<UploadedFile>,
    ) -> AssetResult<EventRow> {
        let fields = validate_fields(fields)?;
        let header = header
            .filter(|h| !h.data.is_empty())
            .ok_or_else(|| AssetError::validation("a header image is required"))?;
        check_header(&header)?;

        let staged = self
            .storage
            .write_staged(Target::Header, &header.file_name, &header.data)
            .await
            .map_err(|e| AssetError::StorageWrite(e.to_string()))?;

        let db = self.db.clone();
        let token_source = self.token_source.clone();
        let event_id = blocking(move || {
            let now = Utc::now();
            for _ in 0..TOKEN_ATTEMPTS {
                let token = token_source();
                if let Some(id) = db.insert_event(owner_id, &fields, Some(staged.reference()), &token, now)? {
                    staged.persist();
                    return Ok(id);
                }
                debug!("Access token collision, drawing another");
            }
            bail!("no unique access token after {} attempts", TOKEN_ATTEMPTS)
        })
        .await?;

        info!("Owner {} created event {}", owner_id, event_id);
        self.load_event(event_id, owner_id).await
    }

    /// Update editable fields, optionally replacing the header image. The old
    /// image is deleted only after the new one is on disk and committed.
    pub async fn update_event(
        &self,
        event_id: i64,
        owner_id: i64,
        fields: EventFields,
        header: Option<UploadedFile>,
    ) -> AssetResult<EventRow> {
        let current = self.load_event(event_id, owner_id).await?;
        let fields = validate_fields(fields)?;

        match header.filter(|h| !h.data.is_empty()) {
            Some(header) => {
                check_header(&header)?;
                let staged = self
                    .storage
                    .write_staged(Target::Header, &header.file_name, &header.data)
                    .await
                    .map_err(|e| AssetError::StorageWrite(e.to_string()))?;

                let db = self.db.clone();
                let updated = blocking(move || {
                    let updated = db.update_event_for_owner(
                        event_id,
                        owner_id,
                        &fields,
                        Some(staged.reference()),
                        Utc::now(),
                    )?;
                    if updated {
                        staged.persist();
                    }
                    Ok(updated)
                })
                .await?;
                if !updated {
                    return Err(AssetError::NotFound);
                }

                if let Some(old) = current.header_image.as_deref() {
                    self.delete_file_logged(old).await;
                }
            }
            None => {
                let db = self.db.clone();
                let updated =
                    blocking(move || db.update_event_for_owner(event_id, owner_id, &fields, None, Utc::now()))
                        .await?;
                if !updated {
                    return Err(AssetError::NotFound);
                }
            }
        }

        info!("Owner {} updated event {}", owner_id, event_id);
        self.load_event(event_id, owner_id).await
    }

    /// Apply a removal. Returns the resulting state, `None` once purged.
    pub async fn remove_event(
        &self,
        event_id: i64,
        owner_id: i64,
        removal: EventRemoval,
    ) -> AssetResult<Option<EventState>> {
        let event = self.load_event(event_id, owner_id).await?;
        let next = EventState::of(&event).after(removal);

        match removal {
            EventRemoval::Deactivate => {
                let db = self.db.clone();
                let changed =
                    blocking(move || db.set_event_active(event_id, owner_id, false, Utc::now())).await?;
                if !changed {
                    return Err(AssetError::NotFound);
                }
                info!("Owner {} deactivated event {}", owner_id, event_id);
            }
            EventRemoval::Purge => {
                // Files first, best-effort.
                if let Err(e) = self.storage.delete_tree(event_id).await {
                    warn!("Event {}: failed to delete storage tree: {}", event_id, e);
                }
                if let Some(header) = event.header_image.as_deref() {
                    self.delete_file_logged(header).await;
                }

                let db = self.db.clone();
                let purged = blocking(move || db.purge_event_for_owner(event_id, owner_id)).await?;
                if !purged {
                    return Err(AssetError::NotFound);
                }
                info!("Owner {} purged event {}", owner_id, event_id);
            }
        }

        Ok(next)
    }

    /// Delete one child asset after re-verifying ownership through its event.
    /// Returns the owning event id.
    pub async fn delete_asset<A: OwnedAsset>(&self, asset_id: i64, owner_id: i64) -> AssetResult<i64> {
        let db = self.db.clone();
        let asset: A = blocking(move || db.find_asset_for_owner::<A>(asset_id, owner_id))
            .await?
            .ok_or(AssetError::NotFound)?;

        if let Some(reference) = asset.storage_ref().map(str::to_string) {
            self.delete_file_logged(&reference).await;
        }

        let db = self.db.clone();
        let deleted = blocking(move || db.delete_asset_for_owner::<A>(asset_id, owner_id)).await?;
        if !deleted {
            return Err(AssetError::NotFound);
        }

        info!("Owner {} deleted {} {} of event {}", owner_id, A::LABEL, asset.id(), asset.event_id());
        Ok(asset.event_id())
    }

    async fn delete_file_logged(&self, reference: &str) {
        if let Err(e) = self.storage.delete(reference).await {
            warn!("Failed to delete stored file {}: {}", reference, e);
        }
    }
}

fn validate_fields(mut fields: EventFields) -> AssetResult<EventFields> {
    fields.title = fields.title.trim().to_string();
    fields.description = fields.description.trim().to_string();
    fields.location = fields.location.trim().to_string();

    if fields.title.is_empty() {
        return Err(AssetError::validation("title is required"));
    }
    if fields.title.chars().count() > MAX_TITLE_CHARS {
        return Err(AssetError::validation("title must be 200 characters or fewer"));
    }
    if fields.description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(AssetError::validation("description must be 1000 characters or fewer"));
    }
    if fields.location.chars().count() > MAX_LOCATION_CHARS {
        return Err(AssetError::validation("location must be 300 characters or fewer"));
    }
    Ok(fields)
}

fn check_header(header: &UploadedFile) -> AssetResult<()> {
    if header.data.len() > MAX_HEADER_BYTES {
        return Err(AssetError::validation("header image must be 10 MB or smaller"));
    }
    let ext = extension_of(&header.file_name).unwrap_or_default();
    if !HEADER_EXTENSIONS.contains(&ext.as_str()) {
        return Err(AssetError::validation("header image must be a jpg, png or gif"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::ingest::Ingest;
    use crate::test_support::{Harness, fields, file, harness, user};

    async fn created(h: &Harness, owner: i64) -> (EventGateway, EventRow) {
        let gateway = EventGateway::new(h.db.clone(), h.storage.clone());
        let event = gateway
            .create_event(owner, fields("Wedding"), Some(file("cover.png", 64)))
            .await
            .unwrap();
        (gateway, event)
    }

    #[tokio::test]
    async fn create_requires_a_header_image() {
        let h = harness().await;
        let owner = user(&h.db, "a@example.com");
        let gateway = EventGateway::new(h.db.clone(), h.storage.clone());

        for header in [None, Some(file("cover.png", 0)), Some(file("cover.bmp", 10))] {
            let err = gateway.create_event(owner, fields("Party"), header).await.unwrap_err();
            assert!(matches!(err, AssetError::Validation(_)));
        }
        assert!(gateway.list_events(owner).await.unwrap().is_empty());
        assert!(h.storage.list_files().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_issues_token_and_keeps_header() {
        let h = harness().await;
        let owner = user(&h.db, "a@example.com");
        let (_gateway, event) = created(&h, owner).await;

        assert_eq!(event.access_token.len(), crate::token::ACCESS_TOKEN_LEN);
        assert!(event.is_active);
        let header = event.header_image.unwrap();
        assert!(header.starts_with("headers/"));
        assert!(h.storage.resolve(&header).unwrap().is_file());
    }

    #[tokio::test]
    async fn token_collisions_are_retried() {
        let h = harness().await;
        let owner = user(&h.db, "a@example.com");
        let (_first, existing) = created(&h, owner).await;

        let queue = Mutex::new(vec!["FRESHTOKEN000001".to_string(), existing.access_token.clone()]);
        let source: TokenSource = Arc::new(move || queue.lock().unwrap().pop().unwrap());
        let gateway = EventGateway::with_token_source(h.db.clone(), h.storage.clone(), source);

        let event = gateway
            .create_event(owner, fields("Second"), Some(file("c.jpg", 8)))
            .await
            .unwrap();
        assert_eq!(event.access_token, "FRESHTOKEN000001");
    }

    #[tokio::test]
    async fn other_owners_only_ever_see_not_found() {
        let h = harness().await;
        let alice = user(&h.db, "alice@example.com");
        let bob = user(&h.db, "bob@example.com");
        let (gateway, event) = created(&h, alice).await;
        let ingest = Ingest::new(h.db.clone(), h.storage.clone());
        let message_id = ingest.ingest_message(event.id, "hi", None).await.unwrap();

        assert!(matches!(gateway.load_event(event.id, bob).await, Err(AssetError::NotFound)));
        assert!(matches!(gateway.event_detail(event.id, bob).await, Err(AssetError::NotFound)));
        assert!(matches!(
            gateway.update_event(event.id, bob, fields("Hijack"), None).await,
            Err(AssetError::NotFound)
        ));
        assert!(matches!(
            gateway.remove_event(event.id, bob, EventRemoval::Deactivate).await,
            Err(AssetError::NotFound)
        ));
        assert!(matches!(
            gateway.remove_event(event.id, bob, EventRemoval::Purge).await,
            Err(AssetError::NotFound)
        ));
        assert!(matches!(
            gateway.delete_asset::<MessageRow>(message_id, bob).await,
            Err(AssetError::NotFound)
        ));
        // Missing ids look exactly the same.
        assert!(matches!(gateway.load_event(event.id + 100, alice).await, Err(AssetError::NotFound)));

        let still_there = gateway.event_detail(event.id, alice).await.unwrap();
        assert_eq!(still_there.event.title, "Wedding");
        assert_eq!(still_there.messages.len(), 1);
    }

    #[tokio::test]
    async fn replacing_the_header_deletes_the_old_file() {
        let h = harness().await;
        let owner = user(&h.db, "a@example.com");
        let (gateway, event) = created(&h, owner).await;
        let old_header = event.header_image.clone().unwrap();

        let updated = gateway
            .update_event(event.id, owner, fields("Renamed"), Some(file("new.jpg", 32)))
            .await
            .unwrap();
        let new_header = updated.header_image.unwrap();

        assert_ne!(new_header, old_header);
        assert!(h.storage.resolve(&new_header).unwrap().is_file());
        assert!(!h.storage.resolve(&old_header).unwrap().exists());
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.access_token, event.access_token);

        let untouched = gateway
            .update_event(event.id, owner, fields("Again"), Some(file("ignored.jpg", 0)))
            .await
            .unwrap();
        assert_eq!(untouched.header_image.as_deref(), Some(new_header.as_str()));
    }

    #[tokio::test]
    async fn deactivate_keeps_everything() {
        let h = harness().await;
        let owner = user(&h.db, "a@example.com");
        let (gateway, event) = created(&h, owner).await;
        Ingest::new(h.db.clone(), h.storage.clone())
            .ingest_media(event.id, vec![file("a.jpg", 10)], None)
            .await
            .unwrap();

        let state = gateway
            .remove_event(event.id, owner, EventRemoval::Deactivate)
            .await
            .unwrap();
        assert_eq!(state, Some(EventState::Inactive));

        let snapshot = gateway.event_detail(event.id, owner).await.unwrap();
        assert!(!snapshot.event.is_active);
        assert_eq!(snapshot.media.len(), 1);
        assert_eq!(h.storage.list_files().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn purge_removes_rows_and_files_even_with_a_missing_file() {
        let h = harness().await;
        let owner = user(&h.db, "a@example.com");
        let (gateway, event) = created(&h, owner).await;
        let ingest = Ingest::new(h.db.clone(), h.storage.clone());
        ingest
            .ingest_media(event.id, vec![file("a.jpg", 10), file("b.mov", 10)], None)
            .await
            .unwrap();
        ingest.ingest_message(event.id, "hello", None).await.unwrap();
        ingest
            .ingest_voice_note(event.id, file("v.webm", 10), None, 2)
            .await
            .unwrap();

        let media = h.db.assets_for_event::<MediaRow>(event.id).unwrap();
        std::fs::remove_file(h.storage.resolve(&media[0].storage_ref).unwrap()).unwrap();

        let state = gateway.remove_event(event.id, owner, EventRemoval::Purge).await.unwrap();
        assert_eq!(state, None);

        assert!(h.db.find_event_by_id(event.id).unwrap().is_none());
        assert!(h.db.assets_for_event::<MediaRow>(event.id).unwrap().is_empty());
        assert!(h.db.assets_for_event::<MessageRow>(event.id).unwrap().is_empty());
        assert!(h.db.assets_for_event::<VoiceNoteRow>(event.id).unwrap().is_empty());
        assert!(!h.storage.event_dir(event.id).exists());
        assert!(h.storage.list_files().unwrap().is_empty());
        assert!(h.db.find_event_by_token(&event.access_token).unwrap().is_none());

        assert!(matches!(
            gateway.remove_event(event.id, owner, EventRemoval::Purge).await,
            Err(AssetError::NotFound)
        ));
    }

    #[tokio::test]
    async fn asset_delete_tolerates_missing_file() {
        let h = harness().await;
        let owner = user(&h.db, "a@example.com");
        let (gateway, event) = created(&h, owner).await;
        let ingest = Ingest::new(h.db.clone(), h.storage.clone());
        let voice_id = ingest
            .ingest_voice_note(event.id, file("v.wav", 10), None, 1)
            .await
            .unwrap();
        let voice: VoiceNoteRow = h.db.find_asset_for_owner(voice_id, owner).unwrap().unwrap();
        std::fs::remove_file(h.storage.resolve(&voice.storage_ref).unwrap()).unwrap();

        let event_id = gateway.delete_asset::<VoiceNoteRow>(voice_id, owner).await.unwrap();
        assert_eq!(event_id, event.id);
        assert!(matches!(
            gateway.delete_asset::<VoiceNoteRow>(voice_id, owner).await,
            Err(AssetError::NotFound)
        ));
    }

    #[test]
    fn removal_transitions() {
        assert_eq!(EventState::Active.after(EventRemoval::Deactivate), Some(EventState::Inactive));
        assert_eq!(EventState::Inactive.after(EventRemoval::Deactivate), Some(EventState::Inactive));
        assert_eq!(EventState::Active.after(EventRemoval::Purge), None);
    }
}
