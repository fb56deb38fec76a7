use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("DB: running migration v1 (initial schema)");
        // AUTOINCREMENT keeps purged event ids from being handed out again,
        // so a new event never inherits a stale storage directory.
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                email           TEXT NOT NULL UNIQUE,
                first_name      TEXT NOT NULL,
                last_name       TEXT NOT NULL,
                password_hash   TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE events (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                access_token    TEXT NOT NULL UNIQUE,
                owner_id        INTEGER NOT NULL REFERENCES users(id),
                title           TEXT NOT NULL,
                description     TEXT NOT NULL DEFAULT '',
                event_date      TEXT NOT NULL,
                location        TEXT NOT NULL DEFAULT '',
                header_image    TEXT,
                is_active       INTEGER NOT NULL DEFAULT 1,
                created_at      TEXT NOT NULL,
                updated_at      TEXT
            );

            CREATE INDEX idx_events_owner ON events(owner_id, is_active, created_at);

            CREATE TABLE retired_tokens (
                token           TEXT PRIMARY KEY,
                retired_at      TEXT NOT NULL
            );

            CREATE TRIGGER events_access_token_immutable
            BEFORE UPDATE OF access_token ON events
            WHEN NEW.access_token IS NOT OLD.access_token
            BEGIN
                SELECT RAISE(ABORT, 'access token is immutable');
            END;

            CREATE TABLE media (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id        INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                storage_ref     TEXT NOT NULL,
                original_name   TEXT NOT NULL,
                kind            TEXT NOT NULL CHECK (kind IN ('Image', 'Video')),
                uploaded_by     TEXT,
                uploaded_at     TEXT NOT NULL,
                is_approved     INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX idx_media_event ON media(event_id);

            CREATE TABLE messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id        INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                body            TEXT NOT NULL,
                sender_name     TEXT,
                created_at      TEXT NOT NULL,
                is_approved     INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX idx_messages_event ON messages(event_id, created_at);

            CREATE TABLE voice_notes (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id        INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                storage_ref     TEXT NOT NULL,
                sender_name     TEXT,
                duration_secs   INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                is_approved     INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX idx_voice_notes_event ON voice_notes(event_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            "
        )?;
    }

    Ok(())
}
