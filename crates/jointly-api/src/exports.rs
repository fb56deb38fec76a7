use axum::{
    Extension,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use jointly_assets::Artifact;
use jointly_types::api::Claims;

use crate::AppState;
use crate::error::ApiError;

/// GET /dashboard/events/{id}/media.zip
pub async fn media_archive(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    Ok(download(state.exporter.media_archive(id, claims.sub).await?))
}

/// GET /dashboard/events/{id}/voice-notes.zip
pub async fn voice_archive(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    Ok(download(state.exporter.voice_archive(id, claims.sub).await?))
}

/// GET /dashboard/events/{id}/messages.txt
pub async fn transcript(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    Ok(download(state.exporter.transcript(id, claims.sub).await?))
}

/// GET /dashboard/events/{id}/card.pdf
pub async fn access_card(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let origin = state.origin(&headers);
    Ok(download(state.exporter.access_card(id, claims.sub, &origin).await?))
}

fn download(artifact: Artifact) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(artifact.content_type));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&artifact.file_name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    (headers, artifact.bytes).into_response()
}

/// ASCII fallback plus an RFC 5987 `filename*` for non-ASCII titles.
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_keeps_unicode_in_the_extended_form() {
        assert_eq!(
            content_disposition("Düğün_media.zip"),
            "attachment; filename=\"D___n_media.zip\"; filename*=UTF-8''D%C3%BC%C4%9F%C3%BCn_media.zip"
        );
    }
}
