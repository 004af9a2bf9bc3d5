//! Gallery Service
//!
//! Photo album backend. Albums and photo records live in PostgreSQL, photo
//! payloads are written as files under the public directory and served
//! statically from `/uploads`.
//!
//! ## Features
//!
//! - **Ingest**: accept one uploaded photo for an album, store the payload
//!   under a fresh random name and record it along with the compression
//!   quality the client reported
//! - **Deletion**: remove single photos or batches, and whole albums, with
//!   best-effort blob cleanup
//! - **Admin sessions**: signed session cookies guarding every mutating
//!   route and the `/admin` pages
//!
//! ## Architecture
//!
//! ```text
//!  multipart upload            public/uploads/          PostgreSQL
//! ┌──────────────┐           ┌──────────────┐          ┌──────────────┐
//! │ POST         │           │ {hex}.{ext}  │          │ albums       │
//! │ /api/photos  │           └──────────────┘          │ photos       │
//! └──────────────┘                  ▲                  └──────────────┘
//!        │                          │                         ▲
//!        ▼                          │                         │
//! ┌──────────────┐   2. put  ┌──────────────┐                │
//! │ Ingestor     │──────────▶│ Blob Store   │                │
//! │              │───────────┼──────────────┼────────────────┘
//! └──────────────┘  1. insert pending, 3. publish
//! ```
//!
//! A photo record is only visible once its blob is on disk. Pending
//! records left behind by a crash are reclaimed at startup.

pub mod api;
pub mod auth;
pub mod blob_store;
pub mod config;
pub mod deletion;
pub mod error;
pub mod ingest;
pub mod models;
pub mod reconcile;
pub mod record_store;

#[cfg(test)]
mod testing;

pub use api::{create_router, start_api_server, AppState};
pub use blob_store::{BlobStore, LocalBlobStore};
pub use config::Config;
pub use deletion::Deleter;
pub use error::{ApiError, ApiResult};
pub use ingest::{IngestError, IngestRequest, Ingestor};
pub use models::{Album, AlbumWithPhotos, Photo, PhotoListing};
pub use reconcile::reclaim_pending;
pub use record_store::{PgRecordStore, RecordStore, StoreError};
