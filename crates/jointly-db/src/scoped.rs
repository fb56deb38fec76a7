//! Owner-scoped access to an event's child assets.
//!
//! Every lookup and delete joins through `events.owner_id`, so a caller can
//! never reach a child row by supplying an asset id that belongs to someone
//! else's event.

use anyhow::Result;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::Database;
use crate::models::{MediaRow, MessageRow, VoiceNoteRow};

/// A child table of `events` that can be loaded and deleted through its owner.
pub trait OwnedAsset: Sized + Send + 'static {
    const TABLE: &'static str;
    /// Columns qualified with the `a` alias, in `from_row` order.
    const COLUMNS: &'static str;
    const ORDER_BY: &'static str;
    /// Human label used in notices ("Media deleted").
    const LABEL: &'static str;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    fn id(&self) -> i64;

    fn event_id(&self) -> i64;

    /// Root-relative storage reference, for kinds that own a file.
    fn storage_ref(&self) -> Option<&str> {
        None
    }
}

impl OwnedAsset for MediaRow {
    const TABLE: &'static str = "media";
    const COLUMNS: &'static str = "a.id, a.event_id, a.storage_ref, a.original_name, a.kind, \
                                   a.uploaded_by, a.uploaded_at, a.is_approved";
    const ORDER_BY: &'static str = "a.id";
    const LABEL: &'static str = "Media";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let kind: String = row.get(4)?;
        Ok(MediaRow {
            id: row.get(0)?,
            event_id: row.get(1)?,
            storage_ref: row.get(2)?,
            original_name: row.get(3)?,
            kind: kind
                .parse()
                .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into()))?,
            uploaded_by: row.get(5)?,
            uploaded_at: row.get(6)?,
            is_approved: row.get(7)?,
        })
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn event_id(&self) -> i64 {
        self.event_id
    }

    fn storage_ref(&self) -> Option<&str> {
        Some(&self.storage_ref)
    }
}

impl OwnedAsset for MessageRow {
    const TABLE: &'static str = "messages";
    const COLUMNS: &'static str = "a.id, a.event_id, a.body, a.sender_name, a.created_at, a.is_approved";
    const ORDER_BY: &'static str = "a.created_at, a.id";
    const LABEL: &'static str = "Message";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(MessageRow {
            id: row.get(0)?,
            event_id: row.get(1)?,
            body: row.get(2)?,
            sender_name: row.get(3)?,
            created_at: row.get(4)?,
            is_approved: row.get(5)?,
        })
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn event_id(&self) -> i64 {
        self.event_id
    }
}

impl OwnedAsset for VoiceNoteRow {
    const TABLE: &'static str = "voice_notes";
    const COLUMNS: &'static str = "a.id, a.event_id, a.storage_ref, a.sender_name, a.duration_secs, \
                                   a.created_at, a.is_approved";
    const ORDER_BY: &'static str = "a.created_at, a.id";
    const LABEL: &'static str = "Voice note";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(VoiceNoteRow {
            id: row.get(0)?,
            event_id: row.get(1)?,
            storage_ref: row.get(2)?,
            sender_name: row.get(3)?,
            duration_secs: row.get(4)?,
            created_at: row.get(5)?,
            is_approved: row.get(6)?,
        })
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn event_id(&self) -> i64 {
        self.event_id
    }

    fn storage_ref(&self) -> Option<&str> {
        Some(&self.storage_ref)
    }
}

/// Load one child row, verifying ownership through the parent event in the
/// same statement.
pub fn asset_for_owner<A: OwnedAsset>(
    conn: &Connection,
    asset_id: i64,
    owner_id: i64,
) -> Result<Option<A>> {
    let sql = format!(
        "SELECT {} FROM {} a JOIN events e ON e.id = a.event_id WHERE a.id = ?1 AND e.owner_id = ?2",
        A::COLUMNS,
        A::TABLE
    );
    let row = conn
        .query_row(&sql, params![asset_id, owner_id], |row| A::from_row(row))
        .optional()?;
    Ok(row)
}

/// All children of one event in the kind's canonical order.
pub fn assets_for_event<A: OwnedAsset>(conn: &Connection, event_id: i64) -> Result<Vec<A>> {
    let sql = format!(
        "SELECT {} FROM {} a WHERE a.event_id = ?1 ORDER BY {}",
        A::COLUMNS,
        A::TABLE,
        A::ORDER_BY
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([event_id], |row| A::from_row(row))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl Database {
    pub fn find_asset_for_owner<A: OwnedAsset>(
        &self,
        asset_id: i64,
        owner_id: i64,
    ) -> Result<Option<A>> {
        self.with_conn(|conn| asset_for_owner(conn, asset_id, owner_id))
    }

    pub fn assets_for_event<A: OwnedAsset>(&self, event_id: i64) -> Result<Vec<A>> {
        self.with_conn(|conn| assets_for_event(conn, event_id))
    }

    /// Delete one child row, re-checking ownership inside the statement.
    /// Returns false when nothing matched.
    pub fn delete_asset_for_owner<A: OwnedAsset>(&self, asset_id: i64, owner_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let sql = format!(
                "DELETE FROM {} WHERE id = ?1 AND event_id IN (SELECT id FROM events WHERE owner_id = ?2)",
                A::TABLE
            );
            let changed = conn.execute(&sql, params![asset_id, owner_id])?;
            Ok(changed > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use jointly_types::models::MediaKind;

    use super::*;
    use crate::test_support::{fields, open_temp, owner};

    #[test]
    fn asset_lookup_is_scoped_to_the_owner() {
        let (_dir, db) = open_temp();
        let alice = owner(&db, "alice@example.com");
        let bob = owner(&db, "bob@example.com");
        let event_id = db
            .insert_event(alice, &fields("Wedding"), None, "TOKENAAAAAAAAAAA", Utc::now())
            .unwrap()
            .unwrap();
        let media_id = db
            .insert_media(event_id, "events/1/media/x_a.jpg", "a.jpg", MediaKind::Image, None, Utc::now())
            .unwrap();

        let found: Option<MediaRow> = db.find_asset_for_owner(media_id, alice).unwrap();
        assert_eq!(found.unwrap().event_id, event_id);

        let hidden: Option<MediaRow> = db.find_asset_for_owner(media_id, bob).unwrap();
        assert!(hidden.is_none());
        assert!(!db.delete_asset_for_owner::<MediaRow>(media_id, bob).unwrap());
        assert!(db.delete_asset_for_owner::<MediaRow>(media_id, alice).unwrap());
        assert!(db.find_asset_for_owner::<MediaRow>(media_id, alice).unwrap().is_none());
    }

    #[test]
    fn messages_come_back_in_creation_order() {
        let (_dir, db) = open_temp();
        let alice = owner(&db, "alice@example.com");
        let event_id = db
            .insert_event(alice, &fields("Party"), None, "TOKENBBBBBBBBBBB", Utc::now())
            .unwrap()
            .unwrap();
        let base = Utc::now();
        db.insert_message(event_id, "third", None, base + Duration::seconds(30)).unwrap();
        db.insert_message(event_id, "first", None, base).unwrap();
        db.insert_message(event_id, "second", Some("Ayse"), base + Duration::seconds(10)).unwrap();

        let bodies: Vec<String> = db
            .assets_for_event::<MessageRow>(event_id)
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies, ["first", "second", "third"]);
    }
}
