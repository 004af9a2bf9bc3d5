//! Startup cleanup of uploads that never became visible.

use crate::blob_store::{BlobError, BlobStore};
use crate::record_store::{RecordStore, StoreError};
use chrono::Utc;
use std::time::Duration;
use tracing::{info, warn};

/// Remove pending photo records older than `grace`, together with any blob
/// they may have written. Returns the number of records reclaimed.
pub async fn reclaim_pending(
    records: &dyn RecordStore,
    blobs: &dyn BlobStore,
    grace: Duration,
) -> Result<usize, StoreError> {
    let grace = chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::zero());
    let cutoff = Utc::now() - grace;

    let stale = records.pending_photos_before(cutoff).await?;
    if stale.is_empty() {
        return Ok(0);
    }

    let mut reclaimed = 0;
    for photo in &stale {
        match blobs.remove(&photo.url).await {
            Ok(()) => {}
            // The crash may have happened before the blob was written
            Err(BlobError::Remove { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, url = %photo.url, "Failed to remove pending blob"),
        }

        if records.delete_photo(photo.id).await? {
            reclaimed += 1;
        }
    }

    metrics::counter!("gallery.pending.reclaimed").increment(reclaimed as u64);
    info!(reclaimed, "Reclaimed stale pending uploads");

    Ok(reclaimed)
}
