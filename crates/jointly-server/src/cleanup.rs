use std::sync::Arc;
use std::time::{Duration, SystemTime};

use jointly_assets::{Storage, sweep_orphans};
use jointly_db::Database;
use tracing::{info, warn};

/// Background task that reaps files no row points at.
///
/// Runs on an interval; files younger than `grace` are left alone so an
/// upload between its write and its commit is never touched.
pub async fn run_cleanup_loop(db: Arc<Database>, storage: Arc<Storage>, every: Duration, grace: Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;

        let db = db.clone();
        let storage = storage.clone();
        let result =
            tokio::task::spawn_blocking(move || sweep_orphans(&db, &storage, grace, SystemTime::now())).await;

        match result {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Cleanup: reaped {} orphaned files", count);
                }
            }
            Ok(Err(e)) => warn!("Cleanup error: {}", e),
            Err(e) => warn!("Cleanup task failed: {}", e),
        }
    }
}
