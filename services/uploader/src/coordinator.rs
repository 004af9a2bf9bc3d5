//! Batch upload: read, compress and submit each selected file in order.
//!
//! A failing item is recorded and skipped. Nothing already uploaded is
//! rolled back and nothing is retried.

use crate::client::{ClientError, IngestedPhoto, PhotoSink, TransferUnit};
use crate::compressor::{Compressor, SourceImage};
use crate::config::MAX_CONCURRENCY;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Reasons a batch is refused before anything is sent
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("No files selected")]
    EmptyBatch,

    #[error("Invalid album id {0}")]
    InvalidAlbum(i32),
}

/// Why a single item failed
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("Failed to read file: {0}")]
    Read(#[from] std::io::Error),

    #[error(transparent)]
    Upload(#[from] ClientError),
}

/// A file that did not make it into the album
#[derive(Debug)]
pub struct ItemFailure {
    /// Position in the selected batch
    pub index: usize,
    pub path: PathBuf,
    pub error: ItemError,
}

/// Outcome of a batch
#[derive(Debug, Default)]
pub struct UploadSummary {
    pub succeeded: usize,
    pub total: usize,
    pub uploaded: Vec<IngestedPhoto>,
    pub failures: Vec<ItemFailure>,
}

impl UploadSummary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }
}

/// `round(100 * completed / total)`, halves rounding up
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = (200 * completed + total) / (2 * total);
    percent.min(100) as u8
}

/// Drives compress-then-upload for a batch of files
pub struct UploadCoordinator {
    compressor: Compressor,
    sink: Arc<dyn PhotoSink>,
    concurrency: usize,
}

impl UploadCoordinator {
    /// `concurrency` is clamped to 1..=4; 1 processes files strictly one at a time
    pub fn new(compressor: Compressor, sink: Arc<dyn PhotoSink>, concurrency: usize) -> Self {
        Self {
            compressor,
            sink,
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
        }
    }

    /// Upload `files` into `album_id`, calling `on_progress` after every item.
    ///
    /// Items complete in selection order whatever the concurrency, so the
    /// reported percentages only ever grow and end at 100.
    #[instrument(skip(self, files, on_progress), fields(total = files.len(), concurrency = self.concurrency))]
    pub async fn run<F>(
        &self,
        files: &[PathBuf],
        album_id: i32,
        mut on_progress: F,
    ) -> Result<UploadSummary, CoordinatorError>
    where
        F: FnMut(u8),
    {
        if files.is_empty() {
            return Err(CoordinatorError::EmptyBatch);
        }
        if album_id <= 0 {
            return Err(CoordinatorError::InvalidAlbum(album_id));
        }

        let total = files.len();
        let mut summary = UploadSummary {
            total,
            ..UploadSummary::default()
        };

        let mut outcomes = stream::iter(files.iter().enumerate())
            .map(|(index, path)| async move {
                (index, path, self.upload_one(path, album_id).await)
            })
            .buffered(self.concurrency);

        let mut completed = 0;
        while let Some((index, path, outcome)) = outcomes.next().await {
            completed += 1;

            match outcome {
                Ok(photo) => {
                    summary.succeeded += 1;
                    summary.uploaded.push(photo);
                }
                Err(error) => {
                    warn!(index, path = %path.display(), error = %error, "Upload failed, continuing");
                    summary.failures.push(ItemFailure {
                        index,
                        path: path.clone(),
                        error,
                    });
                }
            }

            on_progress(progress_percent(completed, total));
        }

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed(),
            "Batch finished"
        );

        Ok(summary)
    }

    async fn upload_one(&self, path: &Path, album_id: i32) -> Result<IngestedPhoto, ItemError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("photo")
            .to_string();

        let compressed = self
            .compressor
            .compress_async(SourceImage { file_name, bytes })
            .await;

        let unit = TransferUnit {
            file_name: compressed.file_name,
            content_type: compressed.content_type,
            bytes: compressed.bytes,
            album_id,
            quality: compressed.quality,
        };

        Ok(self.sink.ingest(unit).await?)
    }
}
