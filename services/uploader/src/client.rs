//! HTTP client for the gallery service.

use crate::config::ServerConfig;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors talking to the gallery service
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Login failed: {0}")]
    LoginFailed(String),
}

/// One photo as sent to the ingest endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferUnit {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub album_id: i32,
    /// Quality the payload was re-encoded at; `None` if sent as-is
    pub quality: Option<u8>,
}

/// Photo record returned by the ingest endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestedPhoto {
    pub id: i32,
    pub album_id: i32,
    pub url: String,
    pub compression_quality: Option<i16>,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Destination for compressed photos
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PhotoSink: Send + Sync {
    /// Submit one photo; the returned record is already visible
    async fn ingest(&self, unit: TransferUnit) -> Result<IngestedPhoto, ClientError>;
}

/// Gallery API client holding an admin session cookie
pub struct GalleryClient {
    http: reqwest::Client,
    base_url: String,
}

impl GalleryClient {
    pub fn new(config: &ServerConfig) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder().cookie_store(true);
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Open an admin session; the cookie is kept for later requests
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.endpoint("/api/auth/login"))
            .json(&serde_json::json!({
                "username": username,
                "password": password,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(match rejection(response).await {
                ClientError::Rejected { message, .. } => ClientError::LoginFailed(message),
                other => other,
            });
        }

        debug!("Admin session opened");
        Ok(())
    }
}

#[async_trait]
impl PhotoSink for GalleryClient {
    #[instrument(skip(self, unit), fields(file = %unit.file_name, size_bytes = unit.bytes.len()))]
    async fn ingest(&self, unit: TransferUnit) -> Result<IngestedPhoto, ClientError> {
        let part = Part::bytes(unit.bytes)
            .file_name(unit.file_name)
            .mime_str(&unit.content_type)?;

        let mut form = Form::new()
            .part("file", part)
            .text("albumId", unit.album_id.to_string());
        if let Some(quality) = unit.quality {
            form = form.text("compressionQuality", quality.to_string());
        }

        let response = self
            .http
            .post(self.endpoint("/api/photos"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        Ok(response.json().await?)
    }
}

/// Turn a non-success response into an error, keeping the server's message
async fn rejection(response: Response) -> ClientError {
    let status = response.status().as_u16();
    let message = match response.text().await {
        Ok(body) => error_message(&body),
        Err(e) => return ClientError::Http(e),
    };

    ClientError::Rejected { status, message }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_string())
}
