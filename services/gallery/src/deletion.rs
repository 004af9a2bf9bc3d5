//! Photo and album removal.
//!
//! Blob removal is best-effort: a failure is logged and the record is
//! removed anyway, which can leave an orphaned file on disk.

use crate::blob_store::{remove_best_effort, BlobStore};
use crate::record_store::{RecordStore, StoreError};
use std::sync::Arc;
use tracing::{info, instrument};

/// Removes photos together with their blobs
pub struct Deleter {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
}

impl Deleter {
    pub fn new(records: Arc<dyn RecordStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { records, blobs }
    }

    /// Delete a single photo. Returns `false` if no such photo exists.
    #[instrument(skip(self))]
    pub async fn delete_photo(&self, id: i32) -> Result<bool, StoreError> {
        let Some(photo) = self.records.get_photo(id).await? else {
            return Ok(false);
        };

        remove_best_effort(self.blobs.as_ref(), &photo.url).await;
        let removed = self.records.delete_photo(photo.id).await?;

        if removed {
            metrics::counter!("gallery.photos.deleted").increment(1);
            info!(photo_id = id, "Photo deleted");
        }

        Ok(removed)
    }

    /// Delete every existing photo among `ids`, returning how many were removed.
    ///
    /// Unknown ids are skipped. Duplicates count once.
    #[instrument(skip(self), fields(requested = ids.len()))]
    pub async fn delete_photos(&self, ids: &[i32]) -> Result<u64, StoreError> {
        let mut unique = ids.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let photos = self.records.find_photos(&unique).await?;
        if photos.is_empty() {
            return Ok(0);
        }

        for photo in &photos {
            remove_best_effort(self.blobs.as_ref(), &photo.url).await;
        }

        let found: Vec<i32> = photos.iter().map(|p| p.id).collect();
        let removed = self.records.delete_photos(&found).await?;

        metrics::counter!("gallery.photos.deleted").increment(removed);
        info!(deleted_count = removed, "Photos deleted");

        Ok(removed)
    }

    /// Delete an album, its photo records and their blobs.
    ///
    /// Returns the number of blobs that belonged to the album, or `None`
    /// if the album does not exist.
    #[instrument(skip(self))]
    pub async fn delete_album(&self, id: i32) -> Result<Option<usize>, StoreError> {
        if self.records.get_album(id).await?.is_none() {
            return Ok(None);
        }

        let urls = self.records.album_blob_urls(id).await?;
        for url in &urls {
            remove_best_effort(self.blobs.as_ref(), url).await;
        }

        if !self.records.delete_album(id).await? {
            return Ok(None);
        }

        info!(album_id = id, photo_count = urls.len(), "Album deleted");
        Ok(Some(urls.len()))
    }
}
