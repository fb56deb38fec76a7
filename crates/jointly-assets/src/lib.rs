pub mod error;
pub mod export;
pub mod gateway;
pub mod ingest;
pub mod storage;
pub mod sweep;
pub mod token;

pub use error::{AssetError, AssetResult};
pub use export::{Artifact, Exporter};
pub use gateway::{EventGateway, EventRemoval, EventSnapshot, EventState};
pub use ingest::{Ingest, IngestReport, UploadedFile};
pub use storage::Storage;
pub use sweep::sweep_orphans;

/// Run a blocking repository call off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> AssetResult<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AssetError::Internal(anyhow::anyhow!("blocking task failed: {}", e)))?
        .map_err(AssetError::Internal)
}
