use crate::auth::{admin_gate, AdminSession, SessionKeys, ADMIN_ROLE};
use crate::blob_store::BlobStore;
use crate::config::{ApiConfig, AuthConfig, StorageConfig};
use crate::deletion::Deleter;
use crate::error::{ApiError, ApiResult};
use crate::ingest::{IngestRequest, Ingestor};
use crate::models::{normalize_album_name, Album, AlbumWithPhotos, Photo, PhotoListing};
use crate::record_store::RecordStore;
use anyhow::{Context, Result};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header::SET_COOKIE, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub records: Arc<dyn RecordStore>,
    pub ingestor: Arc<Ingestor>,
    pub deleter: Arc<Deleter>,
    pub sessions: Arc<SessionKeys>,
    pub service_name: String,
}

impl AppState {
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        auth: &AuthConfig,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            ingestor: Arc::new(Ingestor::new(records.clone(), blobs.clone())),
            deleter: Arc::new(Deleter::new(records.clone(), blobs)),
            sessions: Arc::new(SessionKeys::new(auth)),
            records,
            service_name: service_name.into(),
        }
    }
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Album create request body
#[derive(Debug, Deserialize)]
pub struct CreateAlbumRequest {
    pub name: Option<String>,
}

/// Album rename request body
#[derive(Debug, Deserialize)]
pub struct UpdateAlbumRequest {
    pub id: Option<i32>,
    pub name: Option<String>,
}

/// `?id=` query
#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: Option<String>,
}

/// Query parameters for photo deletion
#[derive(Debug, Deserialize)]
pub struct DeletePhotosQuery {
    pub id: Option<String>,
    pub ids: Option<String>,
}

/// Query parameters for photo list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoListQuery {
    pub album_id: Option<String>,
}

/// Photo deletion response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePhotosResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_count: Option<u64>,
}

/// Album deletion response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAlbumResponse {
    pub message: String,
    pub deleted_photos: usize,
}

/// Authenticated user in login responses
#[derive(Debug, Serialize)]
pub struct SessionUser {
    pub username: String,
    pub role: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub user: SessionUser,
}

/// Create the API router
pub fn create_router(state: AppState, api: &ApiConfig, storage: &StorageConfig) -> Router {
    let cors = if api.cors_enabled {
        if api.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = api
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let admin_pages: Router = Router::new()
        .fallback_service(ServeDir::new(storage.public_dir.join("admin")))
        .layer(middleware::from_fn_with_state(state.clone(), admin_gate));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(database_health))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route(
            "/api/albums",
            get(list_albums)
                .post(create_album)
                .put(update_album)
                .delete(delete_album),
        )
        .route("/api/albums/:album_id", get(get_album))
        .route(
            "/api/photos",
            get(list_photos).post(upload_photo).delete(delete_photos),
        )
        .nest_service("/admin", admin_pages)
        .fallback_service(ServeDir::new(&storage.public_dir))
        .layer(DefaultBodyLimit::max(storage.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.service_name,
    }))
}

/// Database health endpoint
async fn database_health(State(state): State<AppState>) -> impl IntoResponse {
    match state.records.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "message": "Database connection OK"
            })),
        ),
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "message": "Database connection failed"
                })),
            )
        }
    }
}

#[instrument(skip(state, request))]
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let username = request.username.unwrap_or_default();
    let password = request.password.unwrap_or_default();

    state
        .sessions
        .check_credentials(&username, &password)
        .map_err(|_| {
            warn!(username = %username, "Rejected admin login");
            ApiError::InvalidCredentials
        })?;

    let token = state
        .sessions
        .issue(&username)
        .map_err(|e| ApiError::internal("Login failed", e))?;

    info!(username = %username, "Admin logged in");

    Ok((
        [(SET_COOKIE, state.sessions.session_cookie(&token))],
        Json(LoginResponse {
            message: "Login successful".to_string(),
            user: SessionUser {
                username,
                role: ADMIN_ROLE.to_string(),
            },
        }),
    ))
}

async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(SET_COOKIE, state.sessions.clear_cookie())],
        Json(serde_json::json!({ "message": "Logged out" })),
    )
}

/// List albums with their photos
#[instrument(skip(state))]
async fn list_albums(State(state): State<AppState>) -> ApiResult<Json<Vec<AlbumWithPhotos>>> {
    let albums = state
        .records
        .list_albums()
        .await
        .map_err(|e| ApiError::internal("Failed to fetch albums", e))?;

    let photos = state
        .records
        .list_photos(None)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch albums", e))?;

    let mut by_album: HashMap<i32, Vec<Photo>> = HashMap::new();
    for photo in photos {
        by_album.entry(photo.album_id).or_default().push(photo.into());
    }

    let albums = albums
        .into_iter()
        .map(|album| AlbumWithPhotos {
            photos: by_album.remove(&album.id).unwrap_or_default(),
            album,
        })
        .collect();

    Ok(Json(albums))
}

/// Get one album with its photos
#[instrument(skip(state))]
async fn get_album(
    State(state): State<AppState>,
    Path(album_id): Path<i32>,
) -> ApiResult<Json<AlbumWithPhotos>> {
    let album = state
        .records
        .get_album(album_id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch album", e))?
        .ok_or_else(|| ApiError::NotFound("Album not found".to_string()))?;

    let photos = state
        .records
        .list_photos(Some(album_id))
        .await
        .map_err(|e| ApiError::internal("Failed to fetch album", e))?;

    Ok(Json(AlbumWithPhotos {
        album,
        photos: photos.into_iter().map(Photo::from).collect(),
    }))
}

#[instrument(skip(state, _admin, request))]
async fn create_album(
    State(state): State<AppState>,
    _admin: AdminSession,
    Json(request): Json<CreateAlbumRequest>,
) -> ApiResult<(StatusCode, Json<Album>)> {
    let name = normalize_album_name(request.name.as_deref().unwrap_or_default())
        .map_err(|msg| ApiError::BadRequest(msg.to_string()))?;

    let album = state
        .records
        .create_album(&name)
        .await
        .map_err(|e| ApiError::internal("Failed to create album", e))?;

    info!(album_id = album.id, "Album created");
    Ok((StatusCode::CREATED, Json(album)))
}

#[instrument(skip(state, _admin, request))]
async fn update_album(
    State(state): State<AppState>,
    _admin: AdminSession,
    Json(request): Json<UpdateAlbumRequest>,
) -> ApiResult<Json<Album>> {
    let id = request
        .id
        .ok_or_else(|| ApiError::BadRequest("Missing album id".to_string()))?;

    let name = normalize_album_name(request.name.as_deref().unwrap_or_default())
        .map_err(|msg| ApiError::BadRequest(msg.to_string()))?;

    let album = state
        .records
        .rename_album(id, &name)
        .await
        .map_err(|e| ApiError::internal("Failed to update album", e))?
        .ok_or_else(|| ApiError::NotFound("Album not found".to_string()))?;

    Ok(Json(album))
}

#[instrument(skip(state, _admin))]
async fn delete_album(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(query): Query<IdQuery>,
) -> ApiResult<Json<DeleteAlbumResponse>> {
    let raw = query
        .id
        .ok_or_else(|| ApiError::BadRequest("Missing album id".to_string()))?;
    let id = parse_id(&raw).ok_or_else(|| ApiError::BadRequest("Invalid album id".to_string()))?;

    let deleted_photos = state
        .deleter
        .delete_album(id)
        .await
        .map_err(|e| ApiError::internal("Failed to delete album", e))?
        .ok_or_else(|| ApiError::NotFound("Album not found".to_string()))?;

    Ok(Json(DeleteAlbumResponse {
        message: "Album deleted".to_string(),
        deleted_photos,
    }))
}

/// List visible photos, optionally for one album
#[instrument(skip(state))]
async fn list_photos(
    State(state): State<AppState>,
    Query(query): Query<PhotoListQuery>,
) -> ApiResult<Json<Vec<PhotoListing>>> {
    let album_id = match query.album_id.as_deref() {
        Some(raw) => Some(
            parse_id(raw).ok_or_else(|| ApiError::BadRequest("Invalid albumId".to_string()))?,
        ),
        None => None,
    };

    let photos = state
        .records
        .list_photos(album_id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch photos", e))?;

    Ok(Json(photos))
}

/// Ingest one uploaded photo
#[instrument(skip(state, _admin, multipart))]
async fn upload_photo(
    State(state): State<AppState>,
    _admin: AdminSession,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Photo>)> {
    let mut file: Option<(Option<String>, Vec<u8>)> = None;
    let mut album_id: Option<String> = None;
    let mut quality: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = read_field(field.bytes()).await?;
                file = Some((file_name, bytes.to_vec()));
            }
            "albumId" => album_id = Some(read_field(field.text()).await?),
            "compressionQuality" => quality = Some(read_field(field.text()).await?),
            _ => {}
        }
    }

    let album_id = album_id.filter(|s| !s.trim().is_empty());
    let (Some((file_name, bytes)), Some(album_id)) = (file, album_id) else {
        return Err(ApiError::BadRequest("Missing file or albumId".to_string()));
    };

    let album_id =
        parse_id(&album_id).ok_or_else(|| ApiError::BadRequest("Invalid albumId".to_string()))?;

    let compression_quality = match quality.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(raw.parse::<i16>().map_err(|_| {
            ApiError::BadRequest("Invalid compressionQuality".to_string())
        })?),
        _ => None,
    };

    let photo = state
        .ingestor
        .ingest(IngestRequest {
            file_name,
            bytes,
            album_id,
            compression_quality,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(photo)))
}

/// Delete one photo (`?id=`) or several (`?ids=1,2,3`)
#[instrument(skip(state, _admin))]
async fn delete_photos(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(query): Query<DeletePhotosQuery>,
) -> ApiResult<Json<DeletePhotosResponse>> {
    if let Some(raw) = query.id {
        let id =
            parse_id(&raw).ok_or_else(|| ApiError::BadRequest("Invalid photo id".to_string()))?;

        let removed = state
            .deleter
            .delete_photo(id)
            .await
            .map_err(|e| ApiError::internal("Failed to delete photo", e))?;

        if !removed {
            return Err(ApiError::NotFound("Photo not found".to_string()));
        }

        return Ok(Json(DeletePhotosResponse {
            success: true,
            deleted_count: None,
        }));
    }

    let raw = query
        .ids
        .ok_or_else(|| ApiError::BadRequest("Missing photo id or ids".to_string()))?;

    let ids = parse_id_list(&raw)
        .ok_or_else(|| ApiError::BadRequest("Invalid photo ids".to_string()))?;

    let deleted = state
        .deleter
        .delete_photos(&ids)
        .await
        .map_err(|e| ApiError::internal("Failed to delete photo", e))?;

    if deleted == 0 {
        return Err(ApiError::NotFound("No photos found".to_string()));
    }

    Ok(Json(DeletePhotosResponse {
        success: true,
        deleted_count: Some(deleted),
    }))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(format!("Invalid multipart body: {}", e.body_text()))
    }
}

async fn read_field<T>(fut: impl Future<Output = Result<T, MultipartError>>) -> ApiResult<T> {
    fut.await.map_err(multipart_error)
}

fn parse_id(raw: &str) -> Option<i32> {
    raw.trim().parse().ok()
}

fn parse_id_list(raw: &str) -> Option<Vec<i32>> {
    raw.split(',').map(parse_id).collect()
}

/// Start the API server, returning when `shutdown` resolves
pub async fn start_api_server(
    state: AppState,
    api: &ApiConfig,
    storage: &StorageConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state, api, storage);
    let addr = format!("{}:{}", api.host, api.port);

    info!(address = %addr, "Starting gallery API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
