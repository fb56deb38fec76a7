use axum::{
    Form, Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Redirect,
};
use jointly_assets::{AssetError, storage::public_url};
use jointly_db::models::MediaRow;
use jointly_types::api::{MediaItem, Notice, PublicEventView};
use serde::Deserialize;
use tracing::error;

use crate::AppState;
use crate::upload::read_form;

/// GET /Event/{token}: the page a guest lands on after scanning the code.
pub async fn show_event(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(notice): Query<Notice>,
) -> Result<Json<PublicEventView>, StatusCode> {
    let db = state.db.clone();
    let loaded = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let Some(event) = db.find_event_by_token(&token)? else {
            return Ok(None);
        };
        let media = db.assets_for_event::<MediaRow>(event.id)?;
        Ok(Some((event, media)))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|e| {
        error!("DB public event lookup error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let (event, media) = loaded.ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(PublicEventView {
        title: event.title,
        description: event.description,
        event_date: event.event_date,
        location: event.location,
        header_image_url: event.header_image.as_deref().map(public_url),
        media: media.into_iter().filter(|m| m.is_approved).map(media_item).collect(),
        notice,
    }))
}

pub fn media_item(m: MediaRow) -> MediaItem {
    MediaItem {
        id: m.id,
        url: public_url(&m.storage_ref),
        kind: m.kind,
        uploaded_by: m.uploaded_by,
        uploaded_at: m.uploaded_at,
    }
}

/// POST /Event/{token}/media: multipart `files` (repeated), `uploader_name`.
pub async fn upload_media(
    State(state): State<AppState>,
    Path(token): Path<String>,
    multipart: Multipart,
) -> Result<Redirect, StatusCode> {
    let event_id = event_id_for_token(&state, &token).await?;

    let mut form = match read_form(multipart).await {
        Ok(form) => form,
        Err(e) => return Ok(back_to_event(&token, failure(&e))),
    };
    let files = form.take_files("files");
    let uploader = form.text("uploader_name").map(str::to_string);

    let notice = match state.ingest.ingest_media(event_id, files, uploader.as_deref()).await {
        Ok(report) => {
            let success = (report.success_count > 0)
                .then(|| format!("{} file(s) uploaded successfully!", report.success_count));
            let error = (!report.failures.is_empty()).then(|| report.failures.join("; "));
            Notice { success, error }
        }
        Err(e) => failure(&e),
    };
    Ok(back_to_event(&token, notice))
}

#[derive(Debug, Deserialize)]
pub struct MessageForm {
    #[serde(default)]
    pub message: String,
    pub sender_name: Option<String>,
}

/// POST /Event/{token}/messages: form `message`, `sender_name`.
pub async fn post_message(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Form(form): Form<MessageForm>,
) -> Result<Redirect, StatusCode> {
    let event_id = event_id_for_token(&state, &token).await?;

    let notice = match state
        .ingest
        .ingest_message(event_id, &form.message, form.sender_name.as_deref())
        .await
    {
        Ok(_) => success("Your message has been sent!"),
        Err(e) => failure(&e),
    };
    Ok(back_to_event(&token, notice))
}

/// POST /Event/{token}/voice-notes: multipart `audio`, `sender_name`, `duration`.
pub async fn upload_voice_note(
    State(state): State<AppState>,
    Path(token): Path<String>,
    multipart: Multipart,
) -> Result<Redirect, StatusCode> {
    let event_id = event_id_for_token(&state, &token).await?;

    let mut form = match read_form(multipart).await {
        Ok(form) => form,
        Err(e) => return Ok(back_to_event(&token, failure(&e))),
    };
    let Some(audio) = form.take_file("audio") else {
        return Ok(back_to_event(&token, failure(&AssetError::validation("no recording was received"))));
    };
    let sender = form.text("sender_name").map(str::to_string);
    let duration = parse_duration(form.text("duration"));

    let notice = match state
        .ingest
        .ingest_voice_note(event_id, audio, sender.as_deref(), duration)
        .await
    {
        Ok(_) => success("Your voice note has been sent!"),
        Err(e) => failure(&e),
    };
    Ok(back_to_event(&token, notice))
}

/// Browsers report fractional seconds; anything unparseable counts as 0.
fn parse_duration(raw: Option<&str>) -> i64 {
    let raw = raw.unwrap_or_default().trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|d| d.is_finite()).map(|d| d.round() as i64))
        .unwrap_or(0)
}

/// Map a guest-supplied token to the internal event id. Guests never see or
/// send the id itself.
async fn event_id_for_token(state: &AppState, token: &str) -> Result<i64, StatusCode> {
    let db = state.db.clone();
    let token = token.to_string();
    tokio::task::spawn_blocking(move || db.find_event_by_token(&token))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("DB find_event_by_token error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map(|event| event.id)
        .ok_or(StatusCode::NOT_FOUND)
}

fn success(msg: &str) -> Notice {
    Notice {
        success: Some(msg.to_string()),
        error: None,
    }
}

fn failure(e: &AssetError) -> Notice {
    if let AssetError::Internal(inner) = e {
        error!("Contribution failed: {:#}", inner);
    }
    Notice {
        success: None,
        error: Some(e.public_reason()),
    }
}

fn back_to_event(token: &str, notice: Notice) -> Redirect {
    let mut query = Vec::new();
    if let Some(msg) = &notice.success {
        query.push(format!("success={}", urlencoding::encode(msg)));
    }
    if let Some(msg) = &notice.error {
        query.push(format!("error={}", urlencoding::encode(msg)));
    }
    if query.is_empty() {
        Redirect::to(&format!("/Event/{}", token))
    } else {
        Redirect::to(&format!("/Event/{}?{}", token, query.join("&")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_fractional_seconds() {
        assert_eq!(parse_duration(Some("12")), 12);
        assert_eq!(parse_duration(Some(" 7.6 ")), 8);
        assert_eq!(parse_duration(Some("NaN")), 0);
        assert_eq!(parse_duration(Some("soon")), 0);
        assert_eq!(parse_duration(None), 0);
    }
}
