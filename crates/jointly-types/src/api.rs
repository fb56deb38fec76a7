use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MediaKind;

// -- JWT Claims --

/// Session claims. `sub` is the owner's user id; handlers read it through
/// the auth middleware and pass it explicitly into every owner operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: i64,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub email: String,
    pub token: String,
}

// -- Notices --

/// Human-readable outcome carried on redirects back to a page.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Notice {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// -- Assets --

#[derive(Debug, Clone, Serialize)]
pub struct MediaItem {
    pub id: i64,
    pub url: String,
    pub kind: MediaKind,
    pub uploaded_by: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageItem {
    pub id: i64,
    pub message: String,
    pub sender_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceNoteItem {
    pub id: i64,
    pub url: String,
    pub sender_name: Option<String>,
    pub duration_secs: i64,
    pub created_at: DateTime<Utc>,
}

// -- Events --

/// What an anonymous guest sees after scanning the code.
#[derive(Debug, Serialize)]
pub struct PublicEventView {
    pub title: String,
    pub description: String,
    pub event_date: NaiveDateTime,
    pub location: String,
    pub header_image_url: Option<String>,
    pub media: Vec<MediaItem>,
    pub notice: Notice,
}

#[derive(Debug, Serialize)]
pub struct EventSummary {
    pub id: i64,
    pub title: String,
    pub event_date: NaiveDateTime,
    pub location: String,
    pub header_image_url: Option<String>,
    pub access_token: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct EventList {
    pub events: Vec<EventSummary>,
    pub notice: Notice,
}

#[derive(Debug, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub summary: EventSummary,
    pub description: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub access_url: String,
    pub qr_code_png_base64: String,
    pub media: Vec<MediaItem>,
    pub messages: Vec<MessageItem>,
    pub voice_notes: Vec<VoiceNoteItem>,
    pub notice: Notice,
}

/// Structured reply for script-style per-asset deletes.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn event_detail_flattens_the_summary() {
        let detail = EventDetail {
            summary: EventSummary {
                id: 4,
                title: "Wedding".to_string(),
                event_date: NaiveDate::from_ymd_opt(2026, 9, 12)
                    .unwrap()
                    .and_hms_opt(19, 0, 0)
                    .unwrap(),
                location: "Bodrum".to_string(),
                header_image_url: None,
                access_token: "AbCdEfGh12345678".to_string(),
                is_active: true,
                created_at: Utc::now(),
            },
            description: String::new(),
            updated_at: None,
            access_url: "http://localhost/Event/AbCdEfGh12345678".to_string(),
            qr_code_png_base64: String::new(),
            media: vec![],
            messages: vec![],
            voice_notes: vec![],
            notice: Notice::default(),
        };

        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["id"], 4);
        assert_eq!(value["access_token"], "AbCdEfGh12345678");
        assert_eq!(value["event_date"], "2026-09-12T19:00:00");
        assert_eq!(value["notice"], serde_json::json!({}));
    }

    #[test]
    fn register_rejects_unknown_fields() {
        let raw = r#"{"email":"a@b.c","password":"pw","first_name":"A","last_name":"B","admin":true}"#;
        assert!(serde_json::from_str::<RegisterRequest>(raw).is_err());
    }
}
