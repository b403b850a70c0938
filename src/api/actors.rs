use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use super::movies::{DEFAULT_LIMIT, MAX_LIMIT};
use crate::db;
use crate::models::{sort_key, Actor};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_actors))
        .route("/:id", get(get_actor))
}

#[derive(Debug, Deserialize)]
pub struct ActorsQuery {
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ActorDto {
    pub id: String,
    pub name: String,
    pub external_id: Option<i64>,
    pub profile_path: Option<String>,
}

impl From<Actor> for ActorDto {
    fn from(actor: Actor) -> Self {
        Self {
            profile_path: actor.photo_url(),
            id: actor.id,
            name: actor.name,
            external_id: actor.external_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActorDetail {
    #[serde(flatten)]
    pub actor: ActorDto,
    pub movies: Vec<FilmographyEntry>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct FilmographyEntry {
    pub id: String,
    pub title: String,
    pub character: String,
    pub release_date: NaiveDate,
}

async fn list_actors(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActorsQuery>,
) -> Result<Json<Vec<ActorDto>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    let actors: Vec<Actor> = match query.search.as_deref().map(sort_key).filter(|s| !s.is_empty()) {
        Some(search) => {
            sqlx::query_as(
                "SELECT * FROM actors WHERE instr(sort_name, ?) > 0 ORDER BY sort_name, id LIMIT ? OFFSET ?",
            )
            .bind(search)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM actors ORDER BY sort_name, id LIMIT ? OFFSET ?")
                .bind(limit)
                .bind(offset)
                .fetch_all(&state.db)
                .await?
        }
    };

    Ok(Json(actors.into_iter().map(ActorDto::from).collect()))
}

async fn get_actor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ActorDetail>, ApiError> {
    let actor = db::get_actor(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Actor", &id))?;

    let movies: Vec<FilmographyEntry> = sqlx::query_as(
        "SELECT m.id, m.title, c.character, m.release_date FROM movie_cast c
         INNER JOIN movies m ON m.id = c.movie_id
         WHERE c.actor_id = ?
         ORDER BY m.release_date DESC",
    )
    .bind(&id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ActorDetail {
        actor: actor.into(),
        movies,
    }))
}
