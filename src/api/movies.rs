use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use super::error::ApiError;
use crate::db;
use crate::models::{sort_key, Country, Genre, Movie};
use crate::AppState;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_movies))
        .route("/search", get(search_movies))
        .route("/:id", get(get_movie))
        .route("/:id/cast", get(get_cast))
}

#[derive(Debug, Default, Deserialize)]
pub struct MovieListQuery {
    pub search: Option<String>,
    pub genre: Option<String>,
    pub ordering: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MovieListItem {
    pub id: String,
    pub title: String,
    pub overview: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub rating: f64,
    pub release_date: NaiveDate,
    pub vote_count: i64,
    pub genre_ids: Vec<String>,
}

impl MovieListItem {
    fn new(movie: &Movie, genre_ids: Vec<String>) -> Self {
        Self {
            id: movie.id.clone(),
            title: movie.title.clone(),
            overview: movie.overview.clone(),
            poster_path: movie.poster_url(),
            backdrop_path: movie.backdrop_url(),
            rating: movie.rating,
            release_date: movie.release_date,
            vote_count: movie.vote_count,
            genre_ids,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SourceDto {
    pub name: String,
    pub url: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MovieDetail {
    #[serde(flatten)]
    pub summary: MovieListItem,
    pub original_name: Option<String>,
    pub slogan: Option<String>,
    pub film_length: Option<i32>,
    pub age_rating: Option<i32>,
    pub kind: String,
    pub imdb_id: Option<String>,
    pub external_id: Option<i64>,
    pub genres: Vec<Genre>,
    pub countries: Vec<Country>,
    pub sources: Vec<SourceDto>,
}

#[derive(Debug, Serialize)]
pub struct CastMemberDto {
    /// Actor id
    pub id: String,
    pub name: String,
    pub character: String,
    pub profile_path: Option<String>,
}

/// Whitelisted ordering keys; anything else falls back to the default
fn order_clause(ordering: Option<&str>) -> &'static str {
    match ordering.map(str::trim).unwrap_or("") {
        "rating" => "m.rating ASC",
        "-rating" => "m.rating DESC",
        "release_date" => "m.release_date ASC",
        "vote_count" => "m.vote_count ASC",
        "-vote_count" => "m.vote_count DESC",
        "title" => "m.sort_title ASC",
        "-title" => "m.sort_title DESC",
        "-release_date" | "" => "m.release_date DESC",
        other => {
            tracing::debug!("Ignoring unsupported ordering '{}'", other);
            "m.release_date DESC"
        }
    }
}

fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

/// Filtered, ordered movie page with genre ids attached
pub async fn query_movies(
    pool: &SqlitePool,
    query: &MovieListQuery,
) -> Result<Vec<MovieListItem>, sqlx::Error> {
    let (limit, offset) = page(query.limit, query.offset);

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT m.* FROM movies m WHERE 1 = 1");

    // sort_title is already lowercased, so this is a Unicode-aware icontains
    if let Some(search) = query.search.as_deref().map(sort_key).filter(|s| !s.is_empty()) {
        builder
            .push(" AND instr(m.sort_title, ")
            .push_bind(search)
            .push(") > 0");
    }

    if let Some(genre) = query.genre.as_deref().filter(|g| !g.trim().is_empty()) {
        builder
            .push(" AND EXISTS (SELECT 1 FROM movie_genres mg WHERE mg.movie_id = m.id AND mg.genre_id = ")
            .push_bind(genre.trim().to_string())
            .push(")");
    }

    builder
        .push(" ORDER BY ")
        .push(order_clause(query.ordering.as_deref()))
        .push(", m.sort_title ASC, m.id ASC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let movies: Vec<Movie> = builder.build_query_as().fetch_all(pool).await?;

    let ids: Vec<String> = movies.iter().map(|m| m.id.clone()).collect();
    let mut genre_map: HashMap<String, Vec<String>> = HashMap::new();
    for (movie_id, genre_id) in db::genre_ids_for_movies(pool, &ids).await? {
        genre_map.entry(movie_id).or_default().push(genre_id);
    }

    Ok(movies
        .iter()
        .map(|m| {
            let mut genre_ids = genre_map.remove(&m.id).unwrap_or_default();
            genre_ids.sort();
            MovieListItem::new(m, genre_ids)
        })
        .collect())
}

/// Full detail view of a stored movie
pub async fn load_detail(pool: &SqlitePool, movie: &Movie) -> Result<MovieDetail, sqlx::Error> {
    let genres = db::movie_genres(pool, &movie.id).await?;
    let countries = db::movie_countries(pool, &movie.id).await?;
    let sources = db::movie_sources(pool, &movie.id)
        .await?
        .into_iter()
        .map(|s| SourceDto {
            name: s.name,
            url: s.url,
            description: s.description,
        })
        .collect();

    let genre_ids = genres.iter().map(|g| g.id.clone()).collect();

    Ok(MovieDetail {
        summary: MovieListItem::new(movie, genre_ids),
        original_name: movie.original_name.clone(),
        slogan: movie.slogan.clone(),
        film_length: movie.film_length,
        age_rating: movie.age_rating,
        kind: movie.kind.clone(),
        imdb_id: movie.imdb_id.clone(),
        external_id: movie.external_id,
        genres,
        countries,
        sources,
    })
}

async fn list_movies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MovieListQuery>,
) -> Result<Json<Vec<MovieListItem>>, ApiError> {
    Ok(Json(query_movies(&state.db, &query).await?))
}

async fn search_movies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<MovieListItem>>, ApiError> {
    let query = MovieListQuery {
        search: query.q,
        limit: query.limit,
        offset: query.offset,
        ..Default::default()
    };
    Ok(Json(query_movies(&state.db, &query).await?))
}

async fn get_movie(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MovieDetail>, ApiError> {
    let movie = db::get_movie(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Movie", &id))?;

    Ok(Json(load_detail(&state.db, &movie).await?))
}

async fn get_cast(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CastMemberDto>>, ApiError> {
    if db::get_movie(&state.db, &id).await?.is_none() {
        return Err(ApiError::not_found("Movie", &id));
    }

    let cast = db::movie_cast(&state.db, &id)
        .await?
        .into_iter()
        .map(|entry| CastMemberDto {
            profile_path: entry.actor.photo_url(),
            id: entry.actor.id,
            name: entry.actor.name,
            character: entry.character,
        })
        .collect();

    Ok(Json(cast))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{get_json, test_state};
    use axum::http::StatusCode;

    async fn insert_movie(pool: &SqlitePool, id: &str, title: &str, date: &str, rating: f64) {
        sqlx::query(
            "INSERT INTO movies (id, title, sort_title, release_date, rating) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(title)
        .bind(sort_key(title))
        .bind(date)
        .bind(rating)
        .execute(pool)
        .await
        .unwrap();
    }

    #[test]
    fn test_order_clause_whitelist() {
        assert_eq!(order_clause(None), "m.release_date DESC");
        assert_eq!(order_clause(Some("-rating")), "m.rating DESC");
        assert_eq!(order_clause(Some("title")), "m.sort_title ASC");
        assert_eq!(order_clause(Some("id; DROP TABLE movies")), "m.release_date DESC");
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(page(None, None), (20, 0));
        assert_eq!(page(Some(1000), Some(-5)), (100, 0));
        assert_eq!(page(Some(0), Some(40)), (1, 40));
    }

    #[tokio::test]
    async fn test_list_default_order_and_search() {
        let (state, _media) = test_state(None).await;
        insert_movie(&state.db, "m1", "Матрица", "1999-03-31", 8.7).await;
        insert_movie(&state.db, "m2", "Матрица: Перезагрузка", "2003-05-15", 7.7).await;
        insert_movie(&state.db, "m3", "Начало", "2010-07-16", 8.8).await;

        let (status, body) = get_json(state.clone(), "/api/movies").await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["m3", "m2", "m1"]);

        let (_, body) = get_json(state.clone(), "/api/movies/search?q=%D0%9C%D0%90%D0%A2%D0%A0%D0%98%D0%A6%D0%90").await;
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (_, body) = get_json(state, "/api/movies?ordering=-rating&limit=1").await;
        assert_eq!(body[0]["id"], "m3");
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_filters_by_genre() {
        let (state, _media) = test_state(None).await;
        insert_movie(&state.db, "m1", "Один", "2001-01-01", 5.0).await;
        insert_movie(&state.db, "m2", "Два", "2002-01-01", 6.0).await;
        sqlx::query("INSERT INTO genres (id, name) VALUES ('g1', 'Драма')")
            .execute(&state.db)
            .await
            .unwrap();
        sqlx::query("INSERT INTO movie_genres (movie_id, genre_id) VALUES ('m1', 'g1')")
            .execute(&state.db)
            .await
            .unwrap();

        let (_, body) = get_json(state, "/api/movies?genre=g1").await;
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "m1");
        assert_eq!(items[0]["genre_ids"], serde_json::json!(["g1"]));
    }

    #[tokio::test]
    async fn test_detail_and_cast() {
        let (state, _media) = test_state(None).await;
        insert_movie(&state.db, "m1", "Матрица", "1999-03-31", 8.7).await;
        sqlx::query(
            "INSERT INTO actors (id, name, sort_name, profile_image) VALUES ('a1', 'Киану Ривз', 'киану ривз', 'actors/k.jpg'), ('a2', 'Кэрри-Энн Мосс', 'кэрри-энн мосс', NULL)",
        )
        .execute(&state.db)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO movie_cast (id, movie_id, actor_id, character, sort_order) VALUES ('c2', 'm1', 'a2', 'Тринити', 1), ('c1', 'm1', 'a1', 'Нео', 0)",
        )
        .execute(&state.db)
        .await
        .unwrap();

        sqlx::query(
            "INSERT INTO movie_sources (id, movie_id, name, url, description) VALUES
             ('s2', 'm1', 'Okko', 'https://okko.tv/movie/matrix', NULL),
             ('s1', 'm1', 'Кинопоиск', 'https://hd.kinopoisk.ru/film/301', 'По подписке')",
        )
        .execute(&state.db)
        .await
        .unwrap();

        let (status, body) = get_json(state.clone(), "/api/movies/m1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Матрица");
        assert_eq!(body["kind"], "FILM");
        assert_eq!(body["release_date"], "1999-03-31");
        assert!(body["genres"].as_array().unwrap().is_empty());
        assert_eq!(
            body["sources"],
            serde_json::json!([
                {"name": "Okko", "url": "https://okko.tv/movie/matrix", "description": null},
                {"name": "Кинопоиск", "url": "https://hd.kinopoisk.ru/film/301", "description": "По подписке"}
            ])
        );

        let (status, body) = get_json(state.clone(), "/api/movies/m1/cast").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "Киану Ривз");
        assert_eq!(body[0]["character"], "Нео");
        assert_eq!(body[0]["profile_path"], "/media/actors/k.jpg");
        assert_eq!(body[1]["profile_path"], serde_json::Value::Null);

        let (status, body) = get_json(state, "/api/movies/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }
}
