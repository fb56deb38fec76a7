//! Row types, one per SQLite table. API shapes live in jointly-types.

use chrono::{DateTime, NaiveDateTime, Utc};
use jointly_types::models::MediaKind;

pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EventRow {
    pub id: i64,
    pub access_token: String,
    pub owner_id: i64,
    pub title: String,
    pub description: String,
    pub event_date: NaiveDateTime,
    pub location: String,
    pub header_image: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Owner-editable event fields.
#[derive(Debug, Clone)]
pub struct EventFields {
    pub title: String,
    pub description: String,
    pub event_date: NaiveDateTime,
    pub location: String,
}

#[derive(Debug, Clone)]
pub struct MediaRow {
    pub id: i64,
    pub event_id: i64,
    pub storage_ref: String,
    pub original_name: String,
    pub kind: MediaKind,
    pub uploaded_by: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub is_approved: bool,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub event_id: i64,
    pub body: String,
    pub sender_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_approved: bool,
}

#[derive(Debug, Clone)]
pub struct VoiceNoteRow {
    pub id: i64,
    pub event_id: i64,
    pub storage_ref: String,
    pub sender_name: Option<String>,
    pub duration_secs: i64,
    pub created_at: DateTime<Utc>,
    pub is_approved: bool,
}
