// Kinopoisk import: fetch a film and reconcile it into the local catalog

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::sync::LazyLock;
use std::time::Duration;

use super::kinopoisk::{extract_id, FilmData, KinopoiskClient, StaffEntry};
use super::settings;
use crate::config::ImportConfig;
use crate::models::{sort_key, Actor, Movie};

/// Character names are stored with at most this many characters
pub const MAX_CHARACTER_LEN: usize = 255;

/// Character used when the staff entry has no role description
pub const UNKNOWN_ROLE: &str = "Неизвестная роль";

static RE_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Kinopoisk API token is not configured. Set it in the admin settings or via KINOPOISK_API_TOKEN")]
    Configuration,

    #[error("Could not extract a film id from URL: {0}. Expected https://www.kinopoisk.ru/film/435/ or https://www.kinopoisk.ru/series/6058297/")]
    InvalidUrl(String),

    #[error("Kinopoisk rejected the API token (HTTP 401)")]
    Unauthorized,

    #[error("Film {0} not found on Kinopoisk (HTTP 404)")]
    NotFound(i64),

    #[error("Kinopoisk API returned HTTP {status}")]
    Upstream { status: u16 },

    #[error("Kinopoisk request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Kinopoisk returned an unreadable payload: {0}")]
    InvalidPayload(#[source] reqwest::Error),

    #[error("Film payload has no usable title")]
    MissingTitle,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of a successful import
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub movie: Movie,
    /// True when a new movie row was inserted
    pub created: bool,
    /// Cast rows written, or None when the staff listing was unavailable
    /// and the existing cast was left as-is
    pub cast_count: Option<usize>,
}

/// Movie columns derived from a Kinopoisk film payload
#[derive(Debug, Clone, PartialEq)]
pub struct MovieFields {
    pub external_id: i64,
    pub title: String,
    pub original_name: Option<String>,
    pub overview: String,
    pub slogan: Option<String>,
    pub film_length: Option<i32>,
    pub age_rating: Option<i32>,
    pub release_date: NaiveDate,
    pub rating: f64,
    pub vote_count: i64,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub kind: String,
    pub imdb_id: Option<String>,
    pub genres: Vec<String>,
    pub countries: Vec<String>,
}

impl MovieFields {
    pub fn from_film(film_id: i64, film: &FilmData, today: NaiveDate) -> Result<Self, ImportError> {
        let title = resolve_title(film).ok_or(ImportError::MissingTitle)?;

        let overview = clean(&film.description)
            .or_else(|| clean(&film.short_description))
            .unwrap_or_default();

        Ok(Self {
            external_id: film_id,
            original_name: clean(&film.name_original),
            overview,
            slogan: clean(&film.slogan),
            film_length: film.film_length,
            age_rating: film.rating_age_limits.as_deref().and_then(parse_age_rating),
            release_date: resolve_release_date(film, today),
            rating: resolve_rating(film),
            vote_count: resolve_vote_count(film),
            poster_path: clean(&film.poster_url),
            backdrop_path: clean(&film.cover_url),
            kind: clean(&film.kind).unwrap_or_else(|| "FILM".to_string()),
            imdb_id: clean(&film.imdb_id),
            genres: normalized_names(film.genres.iter().map(|g| g.genre.as_str())),
            countries: normalized_names(film.countries.iter().map(|c| c.country.as_str())),
            title,
        })
    }
}

/// Imports films from Kinopoisk into the catalog
pub struct ImportService {
    pool: SqlitePool,
    client: KinopoiskClient,
    cast_limit: usize,
}

impl ImportService {
    /// Resolve the API token (settings row, then config) and build the client.
    /// Fails with [`ImportError::Configuration`] before any network call.
    pub async fn new(pool: SqlitePool, config: &ImportConfig) -> Result<Self, ImportError> {
        let token = settings::resolve_api_token(&pool, config.api_token.as_deref()).await?;
        let client = KinopoiskClient::new(
            token,
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
        )?;

        Ok(Self {
            pool,
            client,
            cast_limit: config.cast_limit,
        })
    }

    pub async fn import_from_url(&self, url: &str) -> Result<ImportOutcome, ImportError> {
        let film_id = extract_id(url)?;
        self.import_film(film_id).await
    }

    pub async fn import_film(&self, film_id: i64) -> Result<ImportOutcome, ImportError> {
        tracing::info!("Importing Kinopoisk film {}", film_id);

        let (film, staff) = self.client.fetch_film(film_id).await?;
        let today = chrono::Local::now().date_naive();
        let fields = MovieFields::from_film(film_id, &film, today)?;

        let outcome = persist_film(&self.pool, &fields, staff.as_deref(), self.cast_limit).await?;

        tracing::info!(
            "Imported '{}' (kinopoisk {}): created={}, cast={}",
            outcome.movie.title,
            film_id,
            outcome.created,
            outcome
                .cast_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unchanged".to_string())
        );

        Ok(outcome)
    }
}

/// Write a film and its relations in one transaction.
/// With `staff` None the movie's existing cast is kept.
pub async fn persist_film(
    pool: &SqlitePool,
    fields: &MovieFields,
    staff: Option<&[StaffEntry]>,
    cast_limit: usize,
) -> Result<ImportOutcome, ImportError> {
    let mut tx = pool.begin().await?;

    let (movie_id, created) = upsert_movie(&mut tx, fields).await?;
    replace_terms(&mut tx, Taxonomy::Genre, &movie_id, &fields.genres).await?;
    replace_terms(&mut tx, Taxonomy::Country, &movie_id, &fields.countries).await?;

    let cast_count = match staff {
        Some(staff) => Some(replace_cast(&mut tx, &movie_id, staff, cast_limit).await?),
        None => {
            tracing::warn!(
                "Cast for '{}' not updated: staff listing unavailable",
                fields.title
            );
            None
        }
    };

    tx.commit().await?;

    let movie = crate::db::get_movie(pool, &movie_id)
        .await?
        .ok_or(ImportError::Database(sqlx::Error::RowNotFound))?;

    Ok(ImportOutcome {
        movie,
        created,
        cast_count,
    })
}

/// Find the movie by external id, then by title + release year.
/// A title match takes over the new external id. Updates in place or inserts.
async fn upsert_movie(
    conn: &mut SqliteConnection,
    fields: &MovieFields,
) -> Result<(String, bool), sqlx::Error> {
    let sort_title = sort_key(&fields.title);

    let mut existing: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM movies WHERE external_id = ? ORDER BY created_at, rowid LIMIT 1",
    )
    .bind(fields.external_id)
    .fetch_optional(&mut *conn)
    .await?;

    if existing.is_none() {
        existing = sqlx::query_as(
            "SELECT id FROM movies
             WHERE sort_title = ? AND substr(release_date, 1, 4) = ?
             ORDER BY created_at, rowid LIMIT 1",
        )
        .bind(&sort_title)
        .bind(format!("{:04}", fields.release_date.year()))
        .fetch_optional(&mut *conn)
        .await?;

        if existing.is_some() {
            tracing::debug!(
                "Matched '{}' ({}) by title and year, backfilling kinopoisk id {}",
                fields.title,
                fields.release_date.year(),
                fields.external_id
            );
        }
    }

    if let Some((id,)) = existing {
        // Uploaded *_image columns are left alone
        sqlx::query(
            r#"
            UPDATE movies SET
                title = ?, sort_title = ?, original_name = ?, overview = ?,
                slogan = ?, film_length = ?, age_rating = ?,
                release_date = ?, rating = ?, vote_count = ?,
                poster_path = ?, backdrop_path = ?,
                kind = ?, external_id = ?, imdb_id = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(&fields.title)
        .bind(&sort_title)
        .bind(&fields.original_name)
        .bind(&fields.overview)
        .bind(&fields.slogan)
        .bind(fields.film_length)
        .bind(fields.age_rating)
        .bind(fields.release_date)
        .bind(fields.rating)
        .bind(fields.vote_count)
        .bind(&fields.poster_path)
        .bind(&fields.backdrop_path)
        .bind(&fields.kind)
        .bind(fields.external_id)
        .bind(&fields.imdb_id)
        .bind(&id)
        .execute(&mut *conn)
        .await?;

        return Ok((id, false));
    }

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO movies (
            id, title, sort_title, original_name, overview, slogan, film_length, age_rating,
            release_date, rating, vote_count, poster_path, backdrop_path, kind, external_id, imdb_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&fields.title)
    .bind(&sort_title)
    .bind(&fields.original_name)
    .bind(&fields.overview)
    .bind(&fields.slogan)
    .bind(fields.film_length)
    .bind(fields.age_rating)
    .bind(fields.release_date)
    .bind(fields.rating)
    .bind(fields.vote_count)
    .bind(&fields.poster_path)
    .bind(&fields.backdrop_path)
    .bind(&fields.kind)
    .bind(fields.external_id)
    .bind(&fields.imdb_id)
    .execute(&mut *conn)
    .await?;

    Ok((id, true))
}

#[derive(Debug, Clone, Copy)]
enum Taxonomy {
    Genre,
    Country,
}

impl Taxonomy {
    fn table(self) -> &'static str {
        match self {
            Taxonomy::Genre => "genres",
            Taxonomy::Country => "countries",
        }
    }

    fn link_table(self) -> &'static str {
        match self {
            Taxonomy::Genre => "movie_genres",
            Taxonomy::Country => "movie_countries",
        }
    }

    fn link_column(self) -> &'static str {
        match self {
            Taxonomy::Genre => "genre_id",
            Taxonomy::Country => "country_id",
        }
    }
}

/// Get a genre/country id by exact (normalized) name, inserting it if missing
async fn get_or_create_term(
    conn: &mut SqliteConnection,
    taxonomy: Taxonomy,
    name: &str,
) -> Result<String, sqlx::Error> {
    let select = format!(
        "SELECT id FROM {} WHERE name = ? ORDER BY rowid LIMIT 1",
        taxonomy.table()
    );
    let existing: Option<(String,)> = sqlx::query_as(&select)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id = uuid::Uuid::new_v4().to_string();
    let insert = format!("INSERT INTO {} (id, name) VALUES (?, ?)", taxonomy.table());
    sqlx::query(&insert)
        .bind(&id)
        .bind(name)
        .execute(&mut *conn)
        .await?;

    tracing::debug!("Created {} '{}'", taxonomy.table(), name);

    Ok(id)
}

/// Replace a movie's genre or country associations
async fn replace_terms(
    conn: &mut SqliteConnection,
    taxonomy: Taxonomy,
    movie_id: &str,
    names: &[String],
) -> Result<(), sqlx::Error> {
    let delete = format!("DELETE FROM {} WHERE movie_id = ?", taxonomy.link_table());
    sqlx::query(&delete)
        .bind(movie_id)
        .execute(&mut *conn)
        .await?;

    let link = format!(
        "INSERT OR IGNORE INTO {} (movie_id, {}) VALUES (?, ?)",
        taxonomy.link_table(),
        taxonomy.link_column()
    );

    for name in names {
        let term_id = get_or_create_term(conn, taxonomy, name).await?;
        sqlx::query(&link)
            .bind(movie_id)
            .bind(&term_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

struct CastRow {
    actor_id: String,
    character: String,
    sort_order: i32,
}

/// Replace the movie's cast with the first `limit` actors of the staff list.
/// Order indexes follow the payload; skipped entries still use up their index.
async fn replace_cast(
    conn: &mut SqliteConnection,
    movie_id: &str,
    staff: &[StaffEntry],
    limit: usize,
) -> Result<usize, sqlx::Error> {
    sqlx::query("DELETE FROM movie_cast WHERE movie_id = ?")
        .bind(movie_id)
        .execute(&mut *conn)
        .await?;

    let mut rows = Vec::new();
    for (order, entry) in staff.iter().filter(|e| e.is_actor()).take(limit).enumerate() {
        let Some(actor_id) = resolve_actor(conn, entry).await? else {
            tracing::debug!("Skipping nameless staff entry {:?}", entry.staff_id);
            continue;
        };

        rows.push(CastRow {
            actor_id,
            character: character_name(entry),
            sort_order: order as i32,
        });
    }

    if rows.is_empty() {
        return Ok(0);
    }

    let count = rows.len();
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "INSERT INTO movie_cast (id, movie_id, actor_id, character, sort_order) ",
    );
    builder.push_values(rows, |mut b, row| {
        b.push_bind(uuid::Uuid::new_v4().to_string())
            .push_bind(movie_id.to_string())
            .push_bind(row.actor_id)
            .push_bind(row.character)
            .push_bind(row.sort_order);
    });
    builder.build().execute(&mut *conn).await?;

    Ok(count)
}

/// Find or create the actor for a staff entry. None when the entry has no name.
async fn resolve_actor(
    conn: &mut SqliteConnection,
    entry: &StaffEntry,
) -> Result<Option<String>, sqlx::Error> {
    let Some(name) = clean(&entry.name_ru).or_else(|| clean(&entry.name_en)) else {
        return Ok(None);
    };
    let photo = clean(&entry.poster_url);

    let mut existing: Option<Actor> = None;

    if let Some(staff_id) = entry.staff_id {
        existing = sqlx::query_as(
            "SELECT * FROM actors WHERE external_id = ? ORDER BY created_at, rowid LIMIT 1",
        )
        .bind(staff_id)
        .fetch_optional(&mut *conn)
        .await?;
    }

    if existing.is_none() {
        existing = sqlx::query_as(
            "SELECT * FROM actors WHERE sort_name = ? ORDER BY created_at, rowid LIMIT 1",
        )
        .bind(sort_key(&name))
        .fetch_optional(&mut *conn)
        .await?;

        if let (Some(actor), Some(staff_id)) = (&existing, entry.staff_id) {
            tracing::debug!("Backfilling kinopoisk id {} for actor '{}'", staff_id, actor.name);
            sqlx::query("UPDATE actors SET external_id = ? WHERE id = ?")
                .bind(staff_id)
                .bind(&actor.id)
                .execute(&mut *conn)
                .await?;
        }
    }

    if let Some(actor) = existing {
        if !actor.has_photo() {
            if let Some(photo) = &photo {
                sqlx::query("UPDATE actors SET profile_path = ? WHERE id = ?")
                    .bind(photo)
                    .bind(&actor.id)
                    .execute(&mut *conn)
                    .await?;
            }
        }
        return Ok(Some(actor.id));
    }

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO actors (id, name, sort_name, external_id, profile_path) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&name)
    .bind(sort_key(&name))
    .bind(entry.staff_id)
    .bind(&photo)
    .execute(&mut *conn)
    .await?;

    Ok(Some(id))
}

/// First non-blank of the Russian, original and English names
pub fn resolve_title(film: &FilmData) -> Option<String> {
    clean(&film.name_ru)
        .or_else(|| clean(&film.name_original))
        .or_else(|| clean(&film.name_en))
}

/// World premiere, then Russian premiere, then January 1st of the year, then today
pub fn resolve_release_date(film: &FilmData, today: NaiveDate) -> NaiveDate {
    let parse = |value: &Option<String>| {
        value
            .as_deref()
            .and_then(|v| NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").ok())
    };

    parse(&film.premiere_world)
        .or_else(|| parse(&film.premiere_ru))
        .or_else(|| film.year.and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1)))
        .unwrap_or(today)
}

/// Kinopoisk rating, falling back to IMDb when it is missing or zero
pub fn resolve_rating(film: &FilmData) -> f64 {
    film.rating_kinopoisk
        .filter(|r| *r != 0.0)
        .or(film.rating_imdb.filter(|r| *r != 0.0))
        .unwrap_or(0.0)
}

pub fn resolve_vote_count(film: &FilmData) -> i64 {
    film.rating_kinopoisk_vote_count
        .filter(|v| *v != 0)
        .or(film.rating_imdb_vote_count.filter(|v| *v != 0))
        .unwrap_or(0)
}

/// "age18" -> 18
pub fn parse_age_rating(value: &str) -> Option<i32> {
    RE_DIGITS.find(value).and_then(|m| m.as_str().parse().ok())
}

/// Trim, uppercase the first character and lowercase the rest.
/// Blank names yield None.
pub fn normalize_taxonomy_name(name: &str) -> Option<String> {
    let mut chars = name.trim().chars();
    let first = chars.next()?;
    Some(
        first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
    )
}

/// Normalized, de-duplicated names in payload order
fn normalized_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names.filter_map(normalize_taxonomy_name) {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn character_name(entry: &StaffEntry) -> String {
    let role = clean(&entry.description).unwrap_or_else(|| UNKNOWN_ROLE.to_string());
    truncate_chars(&role, MAX_CHARACTER_LEN)
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
