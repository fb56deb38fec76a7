use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDateTime;
use jointly_assets::export::access_url;
use jointly_assets::storage::public_url;
use jointly_assets::{AssetError, EventRemoval, UploadedFile};
use jointly_db::OwnedAsset;
use jointly_db::models::{EventFields, EventRow, MediaRow, MessageRow, VoiceNoteRow};
use jointly_types::api::{
    Claims, DeleteResponse, EventDetail, EventList, EventSummary, MessageItem, Notice, VoiceNoteItem,
};
use tracing::error;

use crate::AppState;
use crate::error::{ApiError, status_of};
use crate::public::media_item;
use crate::upload::{FormParts, read_form};

const DATE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"];

pub fn summary(event: &EventRow) -> EventSummary {
    EventSummary {
        id: event.id,
        title: event.title.clone(),
        event_date: event.event_date,
        location: event.location.clone(),
        header_image_url: event.header_image.as_deref().map(public_url),
        access_token: event.access_token.clone(),
        is_active: event.is_active,
        created_at: event.created_at,
    }
}

/// GET /dashboard/events
pub async fn list_events(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(notice): Query<Notice>,
) -> Result<Json<EventList>, ApiError> {
    let events = state.gateway.list_events(claims.sub).await?;
    Ok(Json(EventList {
        events: events.iter().map(summary).collect(),
        notice,
    }))
}

/// POST /dashboard/events: multipart `title`, `description`, `event_date`,
/// `location`, `header_image`.
pub async fn create_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let (fields, header) = event_form(multipart).await?;
    let event = state.gateway.create_event(claims.sub, fields, header).await?;
    Ok((StatusCode::CREATED, Json(summary(&event))))
}

/// GET /dashboard/events/{id}
pub async fn event_detail(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Query(notice): Query<Notice>,
    headers: HeaderMap,
) -> Result<Json<EventDetail>, ApiError> {
    let snapshot = state.gateway.event_detail(id, claims.sub).await?;
    let url = access_url(&state.origin(&headers), &snapshot.event.access_token);
    let qr = state.exporter.qr_png(&url).await?;

    Ok(Json(EventDetail {
        summary: summary(&snapshot.event),
        description: snapshot.event.description,
        updated_at: snapshot.event.updated_at,
        access_url: url,
        qr_code_png_base64: STANDARD.encode(qr),
        media: snapshot.media.into_iter().map(media_item).collect(),
        messages: snapshot
            .messages
            .into_iter()
            .map(|m| MessageItem {
                id: m.id,
                message: m.body,
                sender_name: m.sender_name,
                created_at: m.created_at,
            })
            .collect(),
        voice_notes: snapshot
            .voice_notes
            .into_iter()
            .map(|v| VoiceNoteItem {
                id: v.id,
                url: public_url(&v.storage_ref),
                sender_name: v.sender_name,
                duration_secs: v.duration_secs,
                created_at: v.created_at,
            })
            .collect(),
        notice,
    }))
}

/// POST /dashboard/events/{id}: same form as create; the header image is
/// optional here.
pub async fn update_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<EventSummary>, ApiError> {
    let (fields, header) = event_form(multipart).await?;
    let event = state.gateway.update_event(id, claims.sub, fields, header).await?;
    Ok(Json(summary(&event)))
}

/// POST /dashboard/events/{id}/deactivate
pub async fn deactivate_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let outcome = state
        .gateway
        .remove_event(id, claims.sub, EventRemoval::Deactivate)
        .await
        .map(|_| ("/dashboard/events".to_string(), "Event deactivated".to_string()));
    respond(&headers, outcome)
}

/// POST /dashboard/events/{id}/delete
pub async fn purge_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let outcome = state
        .gateway
        .remove_event(id, claims.sub, EventRemoval::Purge)
        .await
        .map(|_| ("/dashboard/events".to_string(), "Event deleted".to_string()));
    respond(&headers, outcome)
}

/// POST /dashboard/media/{id}/delete
pub async fn delete_media(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    delete_asset::<MediaRow>(&state, claims.sub, id, &headers).await
}

/// POST /dashboard/messages/{id}/delete
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    delete_asset::<MessageRow>(&state, claims.sub, id, &headers).await
}

/// POST /dashboard/voice-notes/{id}/delete
pub async fn delete_voice_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    delete_asset::<VoiceNoteRow>(&state, claims.sub, id, &headers).await
}

async fn delete_asset<A: OwnedAsset>(state: &AppState, owner_id: i64, asset_id: i64, headers: &HeaderMap) -> Response {
    let outcome = state
        .gateway
        .delete_asset::<A>(asset_id, owner_id)
        .await
        .map(|event_id| (format!("/dashboard/events/{}", event_id), format!("{} deleted", A::LABEL)));
    respond(headers, outcome)
}

/// Script-style clients identify themselves with `X-Requested-With` or a
/// JSON content type and get a [`DeleteResponse`]; browsers get redirected.
fn wants_json(headers: &HeaderMap) -> bool {
    let ajax = headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
    let json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));
    ajax || json
}

/// `outcome` is `(redirect target, success message)`. A missing or foreign
/// row is a 404 for every kind of client.
fn respond(headers: &HeaderMap, outcome: Result<(String, String), AssetError>) -> Response {
    let json = wants_json(headers);
    match outcome {
        Err(AssetError::NotFound) if !json => StatusCode::NOT_FOUND.into_response(),
        Ok((_, message)) if json => Json(DeleteResponse { success: true, message }).into_response(),
        Ok((target, message)) => {
            Redirect::to(&format!("{}?success={}", target, urlencoding::encode(&message))).into_response()
        }
        Err(e) if json => {
            let status = status_of(&e);
            let message = e.public_reason();
            if let AssetError::Internal(inner) = &e {
                error!("Delete failed: {:#}", inner);
            }
            (status, Json(DeleteResponse { success: false, message })).into_response()
        }
        Err(e) => {
            if let AssetError::Internal(inner) = &e {
                error!("Delete failed: {:#}", inner);
            }
            let reason = e.public_reason();
            Redirect::to(&format!("/dashboard/events?error={}", urlencoding::encode(&reason))).into_response()
        }
    }
}

async fn event_form(multipart: Multipart) -> Result<(EventFields, Option<UploadedFile>), AssetError> {
    let mut form = read_form(multipart).await?;
    let fields = event_fields(&form)?;
    Ok((fields, form.take_file("header_image")))
}

fn event_fields(form: &FormParts) -> Result<EventFields, AssetError> {
    let raw_date = form.text("event_date").unwrap_or_default().trim();
    let event_date = parse_event_date(raw_date)
        .ok_or_else(|| AssetError::validation("event date must look like 2026-09-12T19:00"))?;

    Ok(EventFields {
        title: form.text("title").unwrap_or_default().to_string(),
        description: form.text("description").unwrap_or_default().to_string(),
        event_date,
        location: form.text("location").unwrap_or_default().to_string(),
    })
}

fn parse_event_date(raw: &str) -> Option<NaiveDateTime> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}
