use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;

use super::error::ApiError;
use crate::models::{Country, Genre};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_genres))
}

pub fn country_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_countries))
}

/// All genres, no pagination
async fn list_genres(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Genre>>, ApiError> {
    let genres = sqlx::query_as("SELECT id, name FROM genres ORDER BY name, id")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(genres))
}

async fn list_countries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Country>>, ApiError> {
    let countries = sqlx::query_as("SELECT id, name FROM countries ORDER BY name, id")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(countries))
}
