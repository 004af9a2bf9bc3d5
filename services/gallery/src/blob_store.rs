use crate::config::StorageConfig;
use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::RngCore;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// Random bytes in a generated blob name (128 bits)
const BLOB_NAME_BYTES: usize = 16;

/// Longest original extension carried over to a blob name
const MAX_EXTENSION_LEN: usize = 10;

/// Errors raised by the blob store
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Failed to create upload directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write blob {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove blob {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("URL {0} does not point into the uploads directory")]
    ForeignUrl(String),
}

/// Name and public URL of a blob that has not been written yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobKey {
    pub file_name: String,
    pub url: String,
}

/// Durable storage for photo payloads
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Pick a fresh blob name, keeping the extension of `original_name`
    fn allocate(&self, original_name: Option<&str>) -> BlobKey;

    /// Write a payload under a freshly allocated key. Never overwrites.
    async fn put(&self, key: &BlobKey, bytes: &[u8]) -> Result<(), BlobError>;

    /// Remove the blob behind a public URL
    async fn remove(&self, url: &str) -> Result<(), BlobError>;
}

/// Blob store writing into a directory under the public root
pub struct LocalBlobStore {
    uploads_dir: PathBuf,
    url_prefix: String,
    default_extension: String,
}

impl LocalBlobStore {
    /// Create a store for `<public_dir>/<uploads_subdir>`, served at `/<uploads_subdir>`
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            uploads_dir: config.uploads_dir(),
            url_prefix: format!("/{}", config.uploads_subdir.trim_matches('/')),
            default_extension: config.default_extension.clone(),
        }
    }

    /// Directory blobs are written into
    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    /// Resolve a public URL to a path inside the uploads directory
    pub fn path_for(&self, url: &str) -> Option<PathBuf> {
        let name = url
            .strip_prefix(&self.url_prefix)
            .and_then(|rest| rest.strip_prefix('/'))?;

        if !is_safe_file_name(name) {
            return None;
        }

        Some(self.uploads_dir.join(name))
    }

    /// Ensure the uploads directory exists
    async fn ensure_dir(&self) -> Result<(), BlobError> {
        tokio::fs::create_dir_all(&self.uploads_dir)
            .await
            .map_err(|source| BlobError::CreateDir {
                path: self.uploads_dir.clone(),
                source,
            })
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn allocate(&self, original_name: Option<&str>) -> BlobKey {
        let extension = blob_extension(original_name, &self.default_extension);
        let file_name = format!("{}.{}", random_hex(BLOB_NAME_BYTES), extension);
        let url = format!("{}/{}", self.url_prefix, file_name);

        BlobKey { file_name, url }
    }

    #[instrument(skip(self, bytes), fields(url = %key.url, size_bytes = bytes.len()))]
    async fn put(&self, key: &BlobKey, bytes: &[u8]) -> Result<(), BlobError> {
        self.ensure_dir().await?;

        let path = self.uploads_dir.join(&key.file_name);
        let write_err = |source| BlobError::Write {
            path: path.clone(),
            source,
        };

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(write_err)?;

        fill_or_discard(&path, file, |mut file| async move {
            file.write_all(bytes).await?;
            file.sync_all().await
        })
        .await
        .map_err(write_err)?;

        debug!(path = %path.display(), "Blob written");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, url: &str) -> Result<(), BlobError> {
        let path = self
            .path_for(url)
            .ok_or_else(|| BlobError::ForeignUrl(url.to_string()))?;

        tokio::fs::remove_file(&path)
            .await
            .map_err(|source| BlobError::Remove {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), "Blob removed");
        Ok(())
    }
}

/// Remove a blob, logging instead of failing.
///
/// Returns whether the blob was actually removed.
pub async fn remove_best_effort(blobs: &dyn BlobStore, url: &str) -> bool {
    match blobs.remove(url).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, url = %url, "Failed to remove blob");
            metrics::counter!("gallery.blobs.delete_failed").increment(1);
            false
        }
    }
}

/// Run `fill` on a freshly created file, removing the file if it fails
async fn fill_or_discard<F, Fut>(path: &Path, file: File, fill: F) -> io::Result<()>
where
    F: FnOnce(File) -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let result = fill(file).await;
    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(error = %e, path = %path.display(), "Failed to remove partial blob");
        }
    }
    result
}

/// Hex string of `len` bytes from the OS random source
fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Extension for a new blob: the original one when it is short and
/// alphanumeric, otherwise `default`
pub fn blob_extension(original_name: Option<&str>, default: &str) -> String {
    original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or_else(|| default.to_string())
}

/// A single path component with no traversal or separators
fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn store_in(dir: &Path) -> LocalBlobStore {
        LocalBlobStore::new(&StorageConfig {
            public_dir: dir.to_path_buf(),
            ..StorageConfig::default()
        })
    }

    #[test]
    fn test_blob_extension() {
        assert_eq!(blob_extension(Some("IMG_0001.JPG"), "jpg"), "jpg");
        assert_eq!(blob_extension(Some("scan.png"), "jpg"), "png");
        assert_eq!(blob_extension(Some("archive.tar.gz"), "jpg"), "gz");
        assert_eq!(blob_extension(Some("noext"), "jpg"), "jpg");
        assert_eq!(blob_extension(Some(".hidden"), "jpg"), "jpg");
        assert_eq!(blob_extension(Some("weird.p?p"), "jpg"), "jpg");
        assert_eq!(blob_extension(Some("long.abcdefghijk"), "jpg"), "jpg");
        assert_eq!(blob_extension(None, "jpg"), "jpg");
    }

    #[test]
    fn test_allocate_uses_128_bit_hex_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let key = store.allocate(Some("beach.png"));
        let (stem, ext) = key.file_name.split_once('.').unwrap();
        assert_eq!(stem.len(), 32);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(ext, "png");
        assert_eq!(key.url, format!("/uploads/{}", key.file_name));
    }

    #[test]
    fn test_allocate_does_not_repeat() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let names: HashSet<String> = (0..1000).map(|_| store.allocate(None).file_name).collect();
        assert_eq!(names.len(), 1000);
    }

    #[test]
    fn test_path_for_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        assert!(store.path_for("/uploads/abc.jpg").is_some());
        assert!(store.path_for("/uploads/../secret").is_none());
        assert!(store.path_for("/uploads/a/b.jpg").is_none());
        assert!(store.path_for("/elsewhere/abc.jpg").is_none());
        assert!(store.path_for("/uploadsabc.jpg").is_none());
    }

    #[tokio::test]
    async fn test_put_creates_directory_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(!store.uploads_dir().exists());

        let key = store.allocate(Some("a.jpg"));
        store.put(&key, b"jpeg bytes").await.unwrap();

        let path = store.path_for(&key.url).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_put_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let key = store.allocate(None);
        store.put(&key, b"first").await.unwrap();
        let err = store.put(&key, b"second").await.unwrap_err();
        assert!(matches!(err, BlobError::Write { .. }));

        let path = store.path_for(&key.url).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_failed_fill_leaves_no_partial_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.ensure_dir().await.unwrap();

        let key = store.allocate(Some("a.jpg"));
        let path = store.path_for(&key.url).unwrap();
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .unwrap();

        let err = fill_or_discard(&path, file, |mut file| async move {
            file.write_all(b"half a jp").await?;
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(store.uploads_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_remove_missing_blob_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let err = store.remove("/uploads/missing.jpg").await.unwrap_err();
        assert!(matches!(err, BlobError::Remove { .. }));

        let err = store.remove("/etc/passwd").await.unwrap_err();
        assert!(matches!(err, BlobError::ForeignUrl(_)));
    }
}
