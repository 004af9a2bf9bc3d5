use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Maximum album name length, in characters
pub const MAX_ALBUM_NAME_CHARS: usize = 50;

/// Named collection of photos
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: i32,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Stored photo record. The blob lives at `url` under the public root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: i32,
    pub album_id: i32,
    pub url: String,
    /// JPEG quality the client re-encoded at, `None` when not recompressed
    pub compression_quality: Option<i16>,
    pub created_at: DateTime<Utc>,
}

/// Photo joined with the name of its album, as shown in listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PhotoListing {
    pub id: i32,
    pub url: String,
    pub album_id: i32,
    pub album_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub compression_quality: Option<i16>,
}

/// Album together with its visible photos
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumWithPhotos {
    #[serde(flatten)]
    pub album: Album,
    pub photos: Vec<Photo>,
}

impl From<PhotoListing> for Photo {
    fn from(p: PhotoListing) -> Self {
        Self {
            id: p.id,
            album_id: p.album_id,
            url: p.url,
            compression_quality: p.compression_quality,
            created_at: p.created_at,
        }
    }
}

/// Trim an album name and check it against the naming policy.
///
/// Returns the trimmed name, or a message suitable for a 400 response.
pub fn normalize_album_name(raw: &str) -> Result<String, &'static str> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("Album name must not be empty");
    }
    if name.chars().count() > MAX_ALBUM_NAME_CHARS {
        return Err("Album name must be at most 50 characters");
    }
    Ok(name.to_string())
}
