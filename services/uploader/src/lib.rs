//! Gallery Uploader
//!
//! Client side of the photo upload pipeline: every selected file is
//! re-encoded as JPEG, then sent to the gallery ingest endpoint one
//! multipart request at a time.
//!
//! # Architecture
//!
//! ```text
//! files -> UploadCoordinator -> Compressor -> PhotoSink (GalleryClient) -> POST /api/photos
//! ```
//!
//! Each file succeeds or fails on its own. The batch always ends with a
//! tally of succeeded and failed items.

pub mod client;
pub mod compressor;
pub mod config;
pub mod coordinator;

pub use client::{ClientError, GalleryClient, IngestedPhoto, PhotoSink, TransferUnit};
pub use compressor::{CompressedImage, Compressor, SourceImage};
pub use config::UploaderConfig;
pub use coordinator::{
    progress_percent, CoordinatorError, ItemError, ItemFailure, UploadCoordinator, UploadSummary,
};
