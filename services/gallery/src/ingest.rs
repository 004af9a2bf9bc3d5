//! Photo ingestion: durably store one uploaded payload and its record.
//!
//! A photo moves through `pending record -> blob written -> visible`.
//! Readers only ever see visible photos, so a visible record always has
//! its blob on disk. A crash between the steps leaves a pending record,
//! which is reclaimed on the next startup.

use crate::blob_store::{remove_best_effort, BlobError, BlobStore};
use crate::models::Photo;
use crate::record_store::{RecordStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Highest accepted compression quality
pub const MAX_COMPRESSION_QUALITY: i16 = 100;

/// Errors that can occur while ingesting a photo
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Album {0} not found")]
    AlbumNotFound(i32),

    #[error("Compression quality {0} is outside 0..=100")]
    InvalidQuality(i16),

    #[error("Upload payload is empty")]
    EmptyPayload,

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Blob(#[from] BlobError),
}

impl From<StoreError> for IngestError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AlbumMissing(id) => IngestError::AlbumNotFound(id),
            other => IngestError::Store(other),
        }
    }
}

/// One uploaded file bound for an album
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Client-side file name, used only for its extension
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
    pub album_id: i32,
    pub compression_quality: Option<i16>,
}

/// Writes blobs and photo records for uploads
pub struct Ingestor {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
}

impl Ingestor {
    pub fn new(records: Arc<dyn RecordStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { records, blobs }
    }

    /// Store the payload and return the visible photo record
    #[instrument(
        skip(self, request),
        fields(album_id = request.album_id, size_bytes = request.bytes.len())
    )]
    pub async fn ingest(&self, request: IngestRequest) -> Result<Photo, IngestError> {
        let result = self.try_ingest(request).await;

        match &result {
            Ok(_) => metrics::counter!("gallery.photos.ingested").increment(1),
            Err(_) => metrics::counter!("gallery.photos.ingest_failed").increment(1),
        }

        result
    }

    async fn try_ingest(&self, request: IngestRequest) -> Result<Photo, IngestError> {
        if request.bytes.is_empty() {
            return Err(IngestError::EmptyPayload);
        }

        if let Some(quality) = request.compression_quality {
            if !(0..=MAX_COMPRESSION_QUALITY).contains(&quality) {
                return Err(IngestError::InvalidQuality(quality));
            }
        }

        if self.records.get_album(request.album_id).await?.is_none() {
            return Err(IngestError::AlbumNotFound(request.album_id));
        }

        let key = self.blobs.allocate(request.file_name.as_deref());

        let pending = self
            .records
            .insert_pending_photo(request.album_id, &key.url, request.compression_quality)
            .await?;

        if let Err(e) = self.blobs.put(&key, &request.bytes).await {
            self.discard_pending(pending.id).await;
            return Err(e.into());
        }

        match self.records.publish_photo(pending.id).await {
            Ok(Some(photo)) => {
                info!(photo_id = photo.id, url = %photo.url, "Photo ingested");
                Ok(photo)
            }
            // The album went away between insert and publish, taking the row with it
            Ok(None) => {
                remove_best_effort(self.blobs.as_ref(), &key.url).await;
                Err(IngestError::AlbumNotFound(request.album_id))
            }
            Err(e) => {
                remove_best_effort(self.blobs.as_ref(), &key.url).await;
                self.discard_pending(pending.id).await;
                Err(e.into())
            }
        }
    }

    /// Drop a pending record; leftovers are reclaimed at startup
    async fn discard_pending(&self, photo_id: i32) {
        if let Err(e) = self.records.delete_photo(photo_id).await {
            warn!(error = %e, photo_id, "Failed to discard pending photo record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::LocalBlobStore;
    use crate::testing::{storage_in, BrokenBlobStore, MemoryRecordStore};
    use std::sync::atomic::Ordering;

    fn request(album_id: i32, quality: Option<i16>) -> IngestRequest {
        IngestRequest {
            file_name: Some("holiday.JPG".to_string()),
            bytes: b"\xff\xd8\xff\xe0 fake jpeg".to_vec(),
            album_id,
            compression_quality: quality,
        }
    }

    #[tokio::test]
    async fn test_ingest_writes_blob_then_visible_record() {
        let dir = tempfile::tempdir().unwrap();
        let records = Arc::new(MemoryRecordStore::new());
        let blobs = Arc::new(LocalBlobStore::new(&storage_in(dir.path())));
        let album = records.seed_album("Holiday");
        let ingestor = Ingestor::new(records.clone(), blobs.clone());

        let photo = ingestor.ingest(request(album.id, Some(70))).await.unwrap();

        assert_eq!(photo.album_id, album.id);
        assert_eq!(photo.compression_quality, Some(70));
        assert!(photo.url.starts_with("/uploads/"));
        assert!(photo.url.ends_with(".jpg"));

        let path = blobs.path_for(&photo.url).unwrap();
        assert!(path.exists());

        let visible = records.visible_in_album(album.id);
        assert_eq!(visible, vec![photo]);
    }

    #[tokio::test]
    async fn test_ingest_without_quality_stores_null() {
        let dir = tempfile::tempdir().unwrap();
        let records = Arc::new(MemoryRecordStore::new());
        let blobs = Arc::new(LocalBlobStore::new(&storage_in(dir.path())));
        let album = records.seed_album("Raw");
        let ingestor = Ingestor::new(records.clone(), blobs);

        let photo = ingestor.ingest(request(album.id, None)).await.unwrap();
        assert_eq!(photo.compression_quality, None);
    }

    #[tokio::test]
    async fn test_unknown_album_is_rejected_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let records = Arc::new(MemoryRecordStore::new());
        let blobs = Arc::new(LocalBlobStore::new(&storage_in(dir.path())));
        let ingestor = Ingestor::new(records.clone(), blobs.clone());

        let err = ingestor.ingest(request(42, Some(80))).await.unwrap_err();

        assert!(matches!(err, IngestError::AlbumNotFound(42)));
        assert_eq!(records.photo_count(), 0);
        assert!(!blobs.uploads_dir().exists());
    }

    #[tokio::test]
    async fn test_out_of_range_quality_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let records = Arc::new(MemoryRecordStore::new());
        let blobs = Arc::new(LocalBlobStore::new(&storage_in(dir.path())));
        let album = records.seed_album("A");
        let ingestor = Ingestor::new(records.clone(), blobs);

        let err = ingestor.ingest(request(album.id, Some(101))).await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidQuality(101)));
    }

    #[tokio::test]
    async fn test_empty_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let records = Arc::new(MemoryRecordStore::new());
        let blobs = Arc::new(LocalBlobStore::new(&storage_in(dir.path())));
        let album = records.seed_album("A");
        let ingestor = Ingestor::new(records.clone(), blobs);

        let mut req = request(album.id, None);
        req.bytes.clear();
        assert!(matches!(
            ingestor.ingest(req).await,
            Err(IngestError::EmptyPayload)
        ));
    }

    #[tokio::test]
    async fn test_blob_write_failure_discards_pending_record() {
        let records = Arc::new(MemoryRecordStore::new());
        let album = records.seed_album("A");
        let ingestor = Ingestor::new(records.clone(), Arc::new(BrokenBlobStore));

        let err = ingestor.ingest(request(album.id, Some(70))).await.unwrap_err();

        assert!(matches!(err, IngestError::Blob(_)));
        assert_eq!(records.photo_count(), 0);
    }

    #[tokio::test]
    async fn test_record_failure_leaves_no_blob() {
        let dir = tempfile::tempdir().unwrap();
        let records = Arc::new(MemoryRecordStore::new());
        let blobs = Arc::new(LocalBlobStore::new(&storage_in(dir.path())));
        let album = records.seed_album("A");
        records.fail_publish.store(true, Ordering::SeqCst);
        let ingestor = Ingestor::new(records.clone(), blobs.clone());

        let err = ingestor.ingest(request(album.id, Some(70))).await.unwrap_err();

        assert!(matches!(err, IngestError::Store(_)));
        assert_eq!(records.photo_count(), 0);
        let leftovers = std::fs::read_dir(blobs.uploads_dir()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_insert_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let records = Arc::new(MemoryRecordStore::new());
        let blobs = Arc::new(LocalBlobStore::new(&storage_in(dir.path())));
        let album = records.seed_album("A");
        records.fail_inserts.store(true, Ordering::SeqCst);
        let ingestor = Ingestor::new(records.clone(), blobs.clone());

        let err = ingestor.ingest(request(album.id, None)).await.unwrap_err();

        assert!(matches!(err, IngestError::Store(_)));
        assert!(!blobs.uploads_dir().exists());
    }
}
