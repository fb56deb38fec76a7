use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use jointly_types::models::MediaKind;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};

use crate::Database;
use crate::models::{EventFields, EventRow, UserRow};

const EVENT_COLUMNS: &str = "id, access_token, owner_id, title, description, event_date, location, \
                             header_image, is_active, created_at, updated_at";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        password_hash: &str,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (email, first_name, last_name, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![email, first_name, last_name, password_hash, Utc::now()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, email, first_name, last_name, password_hash, created_at
                     FROM users WHERE email = ?1",
                    [email],
                    |row| {
                        Ok(UserRow {
                            id: row.get(0)?,
                            email: row.get(1)?,
                            first_name: row.get(2)?,
                            last_name: row.get(3)?,
                            password_hash: row.get(4)?,
                            created_at: row.get(5)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Events --

    /// Insert a new event under `token`.
    ///
    /// Returns `Ok(None)` when the token is already held by a live event or was
    /// retired by a purge; the caller draws a fresh token and retries.
    pub fn insert_event(
        &self,
        owner_id: i64,
        fields: &EventFields,
        header_image: Option<&str>,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let retired: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM retired_tokens WHERE token = ?1)",
                [token],
                |r| r.get(0),
            )?;
            if retired {
                return Ok(None);
            }

            let inserted = tx.execute(
                "INSERT INTO events (access_token, owner_id, title, description, event_date, location,
                                     header_image, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
                params![
                    token,
                    owner_id,
                    &fields.title,
                    &fields.description,
                    fields.event_date,
                    &fields.location,
                    header_image,
                    created_at,
                ],
            );

            match inserted {
                Ok(_) => {
                    let id = tx.last_insert_rowid();
                    tx.commit()?;
                    Ok(Some(id))
                }
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation
                        && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn find_event_by_token(&self, token: &str) -> Result<Option<EventRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {EVENT_COLUMNS} FROM events WHERE access_token = ?1"),
                    [token],
                    event_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn find_event_by_id(&self, id: i64) -> Result<Option<EventRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
                    [id],
                    event_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn find_event_for_owner(&self, id: i64, owner_id: i64) -> Result<Option<EventRow>> {
        self.with_conn(|conn| event_for_owner(conn, id, owner_id))
    }

    /// Active events first, newest first within each group.
    pub fn list_events_for_owner(&self, owner_id: i64) -> Result<Vec<EventRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events
                 WHERE owner_id = ?1
                 ORDER BY is_active DESC, created_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map([owner_id], event_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Update owner-editable fields. `header_image` of `None` keeps the current
    /// image. Returns false when no event matched (missing or not owned).
    pub fn update_event_for_owner(
        &self,
        id: i64,
        owner_id: i64,
        fields: &EventFields,
        header_image: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE events
                 SET title = ?3, description = ?4, event_date = ?5, location = ?6,
                     header_image = COALESCE(?7, header_image), updated_at = ?8
                 WHERE id = ?1 AND owner_id = ?2",
                params![
                    id,
                    owner_id,
                    &fields.title,
                    &fields.description,
                    fields.event_date,
                    &fields.location,
                    header_image,
                    updated_at,
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn set_event_active(
        &self,
        id: i64,
        owner_id: i64,
        active: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE events SET is_active = ?3, updated_at = ?4 WHERE id = ?1 AND owner_id = ?2",
                params![id, owner_id, active, updated_at],
            )?;
            Ok(changed > 0)
        })
    }

    /// Delete an event and (via ON DELETE CASCADE) every child row, retiring
    /// its access token in the same transaction.
    pub fn purge_event_for_owner(&self, id: i64, owner_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let token: Option<String> = tx
                .query_row(
                    "SELECT access_token FROM events WHERE id = ?1 AND owner_id = ?2",
                    params![id, owner_id],
                    |r| r.get(0),
                )
                .optional()?;
            let Some(token) = token else {
                return Ok(false);
            };

            tx.execute(
                "INSERT OR IGNORE INTO retired_tokens (token, retired_at) VALUES (?1, ?2)",
                params![token, Utc::now()],
            )?;
            tx.execute("DELETE FROM events WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(true)
        })
    }

    // -- Contributions --

    pub fn insert_media(
        &self,
        event_id: i64,
        storage_ref: &str,
        original_name: &str,
        kind: MediaKind,
        uploaded_by: Option<&str>,
        uploaded_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO media (event_id, storage_ref, original_name, kind, uploaded_by, uploaded_at, is_approved)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
                params![event_id, storage_ref, original_name, kind.as_str(), uploaded_by, uploaded_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn insert_message(
        &self,
        event_id: i64,
        body: &str,
        sender_name: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (event_id, body, sender_name, created_at, is_approved)
                 VALUES (?1, ?2, ?3, ?4, 1)",
                params![event_id, body, sender_name, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn insert_voice_note(
        &self,
        event_id: i64,
        storage_ref: &str,
        sender_name: Option<&str>,
        duration_secs: i64,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO voice_notes (event_id, storage_ref, sender_name, duration_secs, created_at, is_approved)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)",
                params![event_id, storage_ref, sender_name, duration_secs, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Every storage reference the repository still points at: media and
    /// voice files plus header images.
    pub fn all_storage_refs(&self) -> Result<HashSet<String>> {
        self.with_snapshot(|conn| {
            let mut stmt = conn.prepare(
                "SELECT storage_ref FROM media
                 UNION ALL SELECT storage_ref FROM voice_notes
                 UNION ALL SELECT header_image FROM events WHERE header_image IS NOT NULL",
            )?;
            let refs = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<HashSet<_>, _>>()?;
            Ok(refs)
        })
    }
}

pub fn event_for_owner(conn: &Connection, id: i64, owner_id: i64) -> Result<Option<EventRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1 AND owner_id = ?2"),
            params![id, owner_id],
            event_from_row,
        )
        .optional()?;
    Ok(row)
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: row.get(0)?,
        access_token: row.get(1)?,
        owner_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        event_date: row.get(5)?,
        location: row.get(6)?,
        header_image: row.get(7)?,
        is_active: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::{MediaRow, VoiceNoteRow};
    use crate::test_support::{fields, open_temp, owner};

    #[test]
    fn token_lookup_only_matches_the_token() {
        let (_dir, db) = open_temp();
        let alice = owner(&db, "alice@example.com");
        let id = db
            .insert_event(alice, &fields("Wedding"), None, "Zq8mX2pLr4Tn6Vb1", Utc::now())
            .unwrap()
            .unwrap();

        let found = db.find_event_by_token("Zq8mX2pLr4Tn6Vb1").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(db.find_event_by_token(&id.to_string()).unwrap().is_none());
        assert!(db.find_event_by_token("zq8mx2plr4tn6vb1").unwrap().is_none());
        assert!(db.find_event_by_token("").unwrap().is_none());
    }

    #[test]
    fn duplicate_or_retired_tokens_are_reported_as_collisions() {
        let (_dir, db) = open_temp();
        let alice = owner(&db, "alice@example.com");
        let first = db
            .insert_event(alice, &fields("One"), None, "AAAAAAAAAAAAAAAA", Utc::now())
            .unwrap()
            .unwrap();
        assert!(
            db.insert_event(alice, &fields("Two"), None, "AAAAAAAAAAAAAAAA", Utc::now())
                .unwrap()
                .is_none()
        );

        assert!(db.purge_event_for_owner(first, alice).unwrap());
        assert!(
            db.insert_event(alice, &fields("Three"), None, "AAAAAAAAAAAAAAAA", Utc::now())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn access_token_cannot_be_rewritten() {
        let (_dir, db) = open_temp();
        let alice = owner(&db, "alice@example.com");
        let id = db
            .insert_event(alice, &fields("One"), None, "BBBBBBBBBBBBBBBB", Utc::now())
            .unwrap()
            .unwrap();
        let result = db.with_conn_mut(|conn| {
            conn.execute("UPDATE events SET access_token = 'CCCC' WHERE id = ?1", [id])?;
            Ok(())
        });
        assert!(result.is_err());
    }

    #[test]
    fn owner_listing_puts_active_events_first() {
        let (_dir, db) = open_temp();
        let alice = owner(&db, "alice@example.com");
        let base = Utc::now();
        let old = db
            .insert_event(alice, &fields("Old"), None, "T000000000000001", base)
            .unwrap()
            .unwrap();
        let ended = db
            .insert_event(alice, &fields("Ended"), None, "T000000000000002", base + Duration::minutes(1))
            .unwrap()
            .unwrap();
        let newest = db
            .insert_event(alice, &fields("Newest"), None, "T000000000000003", base + Duration::minutes(2))
            .unwrap()
            .unwrap();
        assert!(db.set_event_active(ended, alice, false, Utc::now()).unwrap());

        let ids: Vec<i64> = db
            .list_events_for_owner(alice)
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, [newest, old, ended]);
    }

    #[test]
    fn purge_cascades_to_every_child_table() {
        let (_dir, db) = open_temp();
        let alice = owner(&db, "alice@example.com");
        let id = db
            .insert_event(alice, &fields("Gala"), Some("headers/h_a.png"), "DDDDDDDDDDDDDDDD", Utc::now())
            .unwrap()
            .unwrap();
        db.insert_media(id, "events/1/media/m_a.jpg", "a.jpg", MediaKind::Image, None, Utc::now())
            .unwrap();
        db.insert_message(id, "hello", None, Utc::now()).unwrap();
        db.insert_voice_note(id, "events/1/voice/v_a.webm", None, 4, Utc::now())
            .unwrap();
        assert_eq!(db.all_storage_refs().unwrap().len(), 3);

        let bob = owner(&db, "bob@example.com");
        assert!(!db.purge_event_for_owner(id, bob).unwrap());
        assert!(db.purge_event_for_owner(id, alice).unwrap());

        assert!(db.find_event_by_id(id).unwrap().is_none());
        assert!(db.assets_for_event::<MediaRow>(id).unwrap().is_empty());
        assert!(db.assets_for_event::<VoiceNoteRow>(id).unwrap().is_empty());
        let messages: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(messages, 0);
        assert!(db.all_storage_refs().unwrap().is_empty());
    }

    #[test]
    fn update_keeps_header_when_none_given() {
        let (_dir, db) = open_temp();
        let alice = owner(&db, "alice@example.com");
        let id = db
            .insert_event(alice, &fields("Before"), Some("headers/old.png"), "EEEEEEEEEEEEEEEE", Utc::now())
            .unwrap()
            .unwrap();

        assert!(db.update_event_for_owner(id, alice, &fields("After"), None, Utc::now()).unwrap());
        let event = db.find_event_by_id(id).unwrap().unwrap();
        assert_eq!(event.title, "After");
        assert_eq!(event.header_image.as_deref(), Some("headers/old.png"));
        assert!(event.updated_at.is_some());
        assert_eq!(event.access_token, "EEEEEEEEEEEEEEEE");
    }
}
