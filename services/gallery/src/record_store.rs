use crate::config::DatabaseConfig;
use crate::models::{Album, Photo, PhotoListing};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors raised by the relational record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Album {0} does not exist")]
    AlbumMissing(i32),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Album and photo persistence.
///
/// Photo reads only ever return visible photos. A photo is inserted
/// pending and becomes visible once its blob is on disk.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Round-trip to the database
    async fn ping(&self) -> Result<(), StoreError>;

    /// All albums, newest first
    async fn list_albums(&self) -> Result<Vec<Album>, StoreError>;

    async fn get_album(&self, id: i32) -> Result<Option<Album>, StoreError>;

    async fn create_album(&self, name: &str) -> Result<Album, StoreError>;

    /// Rename an album, `None` if it does not exist
    async fn rename_album(&self, id: i32, name: &str) -> Result<Option<Album>, StoreError>;

    /// Delete an album and, by cascade, all of its photo records
    async fn delete_album(&self, id: i32) -> Result<bool, StoreError>;

    /// Blob URLs of every photo in an album, pending ones included
    async fn album_blob_urls(&self, album_id: i32) -> Result<Vec<String>, StoreError>;

    /// Visible photos with their album name, newest first
    async fn list_photos(&self, album_id: Option<i32>) -> Result<Vec<PhotoListing>, StoreError>;

    async fn get_photo(&self, id: i32) -> Result<Option<Photo>, StoreError>;

    /// Visible photos among `ids`
    async fn find_photos(&self, ids: &[i32]) -> Result<Vec<Photo>, StoreError>;

    /// Insert a photo record that readers cannot see yet
    async fn insert_pending_photo(
        &self,
        album_id: i32,
        url: &str,
        compression_quality: Option<i16>,
    ) -> Result<Photo, StoreError>;

    /// Make a pending photo visible
    async fn publish_photo(&self, id: i32) -> Result<Option<Photo>, StoreError>;

    /// Delete one photo record, pending or visible
    async fn delete_photo(&self, id: i32) -> Result<bool, StoreError>;

    /// Delete photo records, returning how many rows went away
    async fn delete_photos(&self, ids: &[i32]) -> Result<u64, StoreError>;

    /// Pending photos created before `cutoff`
    async fn pending_photos_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Photo>, StoreError>;
}

/// PostgreSQL-backed record store
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Create a new record store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list_albums(&self) -> Result<Vec<Album>, StoreError> {
        let albums = sqlx::query_as::<_, Album>(
            "SELECT id, name, created_at FROM albums ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(albums)
    }

    async fn get_album(&self, id: i32) -> Result<Option<Album>, StoreError> {
        let album =
            sqlx::query_as::<_, Album>("SELECT id, name, created_at FROM albums WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(album)
    }

    #[instrument(skip(self))]
    async fn create_album(&self, name: &str) -> Result<Album, StoreError> {
        let album = sqlx::query_as::<_, Album>(
            "INSERT INTO albums (name) VALUES ($1) RETURNING id, name, created_at",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        debug!(album_id = album.id, "Album created");
        Ok(album)
    }

    #[instrument(skip(self))]
    async fn rename_album(&self, id: i32, name: &str) -> Result<Option<Album>, StoreError> {
        let album = sqlx::query_as::<_, Album>(
            "UPDATE albums SET name = $2 WHERE id = $1 RETURNING id, name, created_at",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(album)
    }

    #[instrument(skip(self))]
    async fn delete_album(&self, id: i32) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM albums WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn album_blob_urls(&self, album_id: i32) -> Result<Vec<String>, StoreError> {
        let urls: Vec<(String,)> = sqlx::query_as("SELECT url FROM photos WHERE album_id = $1")
            .bind(album_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(urls.into_iter().map(|(url,)| url).collect())
    }

    #[instrument(skip(self))]
    async fn list_photos(&self, album_id: Option<i32>) -> Result<Vec<PhotoListing>, StoreError> {
        let photos = sqlx::query_as::<_, PhotoListing>(
            r#"
            SELECT p.id, p.url, p.album_id, a.name AS album_name,
                   p.created_at, p.compression_quality
            FROM photos p
            LEFT JOIN albums a ON a.id = p.album_id
            WHERE p.visible
              AND ($1::int4 IS NULL OR p.album_id = $1)
            ORDER BY p.created_at DESC, p.id DESC
            "#,
        )
        .bind(album_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(photos)
    }

    async fn get_photo(&self, id: i32) -> Result<Option<Photo>, StoreError> {
        let photo = sqlx::query_as::<_, Photo>(
            r#"
            SELECT id, album_id, url, compression_quality, created_at
            FROM photos
            WHERE id = $1 AND visible
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(photo)
    }

    async fn find_photos(&self, ids: &[i32]) -> Result<Vec<Photo>, StoreError> {
        let photos = sqlx::query_as::<_, Photo>(
            r#"
            SELECT id, album_id, url, compression_quality, created_at
            FROM photos
            WHERE id = ANY($1) AND visible
            ORDER BY id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(photos)
    }

    #[instrument(skip(self))]
    async fn insert_pending_photo(
        &self,
        album_id: i32,
        url: &str,
        compression_quality: Option<i16>,
    ) -> Result<Photo, StoreError> {
        let photo = sqlx::query_as::<_, Photo>(
            r#"
            INSERT INTO photos (album_id, url, compression_quality, visible)
            VALUES ($1, $2, $3, FALSE)
            RETURNING id, album_id, url, compression_quality, created_at
            "#,
        )
        .bind(album_id)
        .bind(url)
        .bind(compression_quality)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                StoreError::AlbumMissing(album_id)
            }
            _ => StoreError::Database(e),
        })?;

        Ok(photo)
    }

    #[instrument(skip(self))]
    async fn publish_photo(&self, id: i32) -> Result<Option<Photo>, StoreError> {
        let photo = sqlx::query_as::<_, Photo>(
            r#"
            UPDATE photos SET visible = TRUE
            WHERE id = $1
            RETURNING id, album_id, url, compression_quality, created_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(photo)
    }

    #[instrument(skip(self))]
    async fn delete_photo(&self, id: i32) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM photos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn delete_photos(&self, ids: &[i32]) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM photos WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn pending_photos_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Photo>, StoreError> {
        let photos = sqlx::query_as::<_, Photo>(
            r#"
            SELECT id, album_id, url, compression_quality, created_at
            FROM photos
            WHERE NOT visible AND created_at < $1
            ORDER BY created_at
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(photos)
    }
}
