use std::time::{Duration, SystemTime};

use anyhow::Result;
use jointly_db::Database;
use tracing::{debug, warn};

use crate::storage::Storage;

/// Delete files under the storage root that no row references and that are
/// older than `grace`. Covers stale `.part` staging files as well.
///
/// The directory listing is taken before the reference set, so a file whose
/// row commits mid-sweep is always seen as referenced. Blocking.
pub fn sweep_orphans(db: &Database, storage: &Storage, grace: Duration, now: SystemTime) -> Result<usize> {
    let files = storage.list_files()?;
    let referenced = db.all_storage_refs()?;

    let mut removed = 0;
    for file in files {
        if referenced.contains(&file.reference) {
            continue;
        }
        let age = now.duration_since(file.modified).unwrap_or_default();
        if age < grace {
            debug!("Unreferenced file {} is too young to reap", file.reference);
            continue;
        }
        match std::fs::remove_file(&file.path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to reap orphan {}: {}", file.reference, e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Ingest;
    use crate::storage::{PART_SUFFIX, Target};
    use crate::test_support::{file, harness, user};

    #[tokio::test]
    async fn only_old_unreferenced_files_are_reaped() {
        let h = harness().await;
        let owner = user(&h.db, "a@example.com");
        let event_id = h
            .db
            .insert_event(owner, &crate::test_support::fields("Party"), None, "SWEEPTOKEN000001", chrono::Utc::now())
            .unwrap()
            .unwrap();
        Ingest::new(h.db.clone(), h.storage.clone())
            .ingest_media(event_id, vec![file("kept.jpg", 10)], None)
            .await
            .unwrap();

        let orphan = h
            .storage
            .write_staged(Target::Header, "orphan.png", b"x")
            .await
            .unwrap()
            .persist();
        let part_dir = h.storage.dir_path(Target::Asset { event_id, kind: jointly_types::models::AssetKind::Voice });
        std::fs::create_dir_all(&part_dir).unwrap();
        std::fs::write(part_dir.join(format!("abc_note.webm{}", PART_SUFFIX)), b"half").unwrap();

        let grace = Duration::from_secs(3600);
        let now = SystemTime::now();
        assert_eq!(sweep_orphans(&h.db, &h.storage, grace, now).unwrap(), 0);

        let later = now + Duration::from_secs(7200);
        assert_eq!(sweep_orphans(&h.db, &h.storage, grace, later).unwrap(), 2);

        let remaining = h.storage.list_files().unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].reference.ends_with("_kept.jpg"));
        assert!(!h.storage.resolve(&orphan).unwrap().exists());
    }
}
