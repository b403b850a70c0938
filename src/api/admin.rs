use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap},
    routing::{get, post, put},
    Json, Router,
};
use constant_time_eq::constant_time_eq;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use super::movies::{load_detail, MovieDetail};
use crate::db;
use crate::models::{display_url, ImageSlot};
use crate::services::images::{store_image, CompressOptions};
use crate::services::import::{ImportError, ImportService};
use crate::services::settings::{self, TokenSource};
use crate::AppState;

/// Raw upload size accepted before compression
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/import", post(import_movie))
        .route("/settings", get(get_settings).put(update_settings))
        .route("/movies/:id/poster", put(upload_poster))
        .route("/movies/:id/backdrop", put(upload_backdrop))
        .route("/actors/:id/photo", put(upload_actor_photo))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub external_url: String,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    #[serde(flatten)]
    pub movie: MovieDetail,
    pub created: bool,
    /// Null when the cast could not be refreshed
    pub cast_count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub has_api_token: bool,
    pub source: Option<TokenSource>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub kinopoisk_api_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Relative to the media directory
    pub path: String,
    pub url: Option<String>,
}

/// Token from an `Authorization: Bearer <token>` value; the scheme is case-insensitive
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

/// Static bearer token check
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = state
        .config
        .admin_token
        .as_deref()
        .ok_or(ApiError::Unauthorized)?;

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or(ApiError::Unauthorized)?;

    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        tracing::warn!("Rejected admin request with invalid token");
        return Err(ApiError::Unauthorized);
    }

    Ok(())
}

async fn import_movie(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ImportRequest>,
) -> Result<Json<ImportResponse>, ApiError> {
    require_admin(&state, &headers)?;

    let url = req.external_url.trim();
    if url.is_empty() {
        return Err(ImportError::InvalidUrl(String::new()).into());
    }

    let service = ImportService::new(state.db.clone(), &state.config.import).await?;
    let outcome = service.import_from_url(url).await?;

    Ok(Json(ImportResponse {
        movie: load_detail(&state.db, &outcome.movie).await?,
        created: outcome.created,
        cast_count: outcome.cast_count,
    }))
}

async fn settings_response(state: &AppState) -> Result<SettingsResponse, ApiError> {
    let token = settings::api_token(&state.db, state.config.import.api_token.as_deref()).await?;
    Ok(SettingsResponse {
        has_api_token: token.is_some(),
        source: token.map(|(_, source)| source),
    })
}

async fn get_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SettingsResponse>, ApiError> {
    require_admin(&state, &headers)?;
    Ok(Json(settings_response(&state).await?))
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<SettingsResponse>, ApiError> {
    require_admin(&state, &headers)?;
    settings::set_api_token(&state.db, req.kinopoisk_api_token.as_deref()).await?;
    Ok(Json(settings_response(&state).await?))
}

async fn upload(
    state: &AppState,
    headers: &HeaderMap,
    slot: ImageSlot,
    id: &str,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    require_admin(state, headers)?;

    let exists = match slot {
        ImageSlot::Poster | ImageSlot::Backdrop => db::get_movie(&state.db, id).await?.is_some(),
        ImageSlot::ActorPhoto => db::get_actor(&state.db, id).await?.is_some(),
    };
    if !exists {
        let kind = if slot == ImageSlot::ActorPhoto { "Actor" } else { "Movie" };
        return Err(ApiError::not_found(kind, id));
    }

    if body.is_empty() {
        return Err(ApiError::BadRequest("Empty image body".to_string()));
    }

    let path = store_image(
        &state.config.paths.media_dir,
        slot,
        body.to_vec(),
        CompressOptions::from(&state.config.media),
    )
    .await?;

    if !db::set_image(&state.db, slot, id, &path).await? {
        return Err(ApiError::not_found("Owner", id));
    }

    Ok(Json(UploadResponse {
        url: display_url(Some(&path), None),
        path,
    }))
}

async fn upload_poster(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    upload(&state, &headers, ImageSlot::Poster, &id, body).await
}

async fn upload_backdrop(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    upload(&state, &headers, ImageSlot::Backdrop, &id, body).await
}

async fn upload_actor_photo(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    upload(&state, &headers, ImageSlot::ActorPhoto, &id, body).await
}
