use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use jointly_assets::AssetError;
use jointly_types::api::Notice;
use tracing::error;

/// HTTP face of an [`AssetError`]. Internal causes are logged, never sent.
#[derive(Debug)]
pub struct ApiError(pub AssetError);

impl From<AssetError> for ApiError {
    fn from(e: AssetError) -> Self {
        ApiError(e)
    }
}

pub fn status_of(e: &AssetError) -> StatusCode {
    match e {
        AssetError::NotFound => StatusCode::NOT_FOUND,
        AssetError::Validation(_) | AssetError::StorageWrite(_) => StatusCode::BAD_REQUEST,
        AssetError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(&self.0);
        match &self.0 {
            AssetError::Internal(e) => error!("Request failed: {:#}", e),
            AssetError::StorageWrite(e) => error!("Storage write failed: {}", e),
            _ => {}
        }
        let notice = Notice {
            success: None,
            error: Some(self.0.public_reason()),
        };
        (status, Json(notice)).into_response()
    }
}
