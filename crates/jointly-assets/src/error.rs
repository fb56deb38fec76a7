use thiserror::Error;

/// Outcome of a failed asset operation, scoped to a single request.
#[derive(Debug, Error)]
pub enum AssetError {
    /// Missing, or owned by someone else. Callers must not be able to tell
    /// the two apart.
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("storage write failed: {0}")]
    StorageWrite(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AssetResult<T> = Result<T, AssetError>;

impl AssetError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AssetError::Validation(msg.into())
    }

    /// Reason safe to show to the person who made the request.
    pub fn public_reason(&self) -> String {
        match self {
            AssetError::NotFound => "not found".to_string(),
            AssetError::Validation(msg) => msg.clone(),
            AssetError::StorageWrite(_) | AssetError::Internal(_) => {
                "upload failed, please try again".to_string()
            }
        }
    }
}
