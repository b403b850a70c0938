use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

use crate::models::{Actor, Country, Genre, ImageSlot, Movie, MovieSource};

pub mod seed;

/// Open the SQLite pool with per-connection PRAGMAs
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("Invalid database URL: {}", database_url))?
        .create_if_missing(true)
        // WAL for concurrent readers while an import writes
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                use sqlx::Executor;
                // Cache size: -16000 = 16MB (negative = KB)
                conn.execute("PRAGMA cache_size = -16000").await?;
                conn.execute("PRAGMA temp_store = MEMORY").await?;
                Ok(())
            })
        })
        .connect_with(connect_options)
        .await
        .context("Failed to open database")?;

    tracing::info!("SQLite configured: WAL mode, 16MB cache (per connection)");

    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        -- Genre names are unique by convention only (normalized before lookup)
        CREATE TABLE IF NOT EXISTS genres (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS countries (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS actors (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sort_name TEXT NOT NULL,
            external_id INTEGER,
            profile_image TEXT,  -- relative to the media directory
            profile_path TEXT,   -- external URL
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS movies (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            sort_title TEXT NOT NULL,
            original_name TEXT,
            overview TEXT NOT NULL DEFAULT '',
            slogan TEXT,
            film_length INTEGER,
            age_rating INTEGER,
            release_date TEXT NOT NULL,
            rating REAL NOT NULL DEFAULT 0,
            vote_count INTEGER NOT NULL DEFAULT 0,
            poster_image TEXT,
            poster_path TEXT,
            backdrop_image TEXT,
            backdrop_path TEXT,
            kind TEXT NOT NULL DEFAULT 'FILM',
            external_id INTEGER,
            imdb_id TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS movie_genres (
            movie_id TEXT NOT NULL REFERENCES movies(id) ON DELETE CASCADE,
            genre_id TEXT NOT NULL REFERENCES genres(id) ON DELETE CASCADE,
            PRIMARY KEY (movie_id, genre_id)
        );

        CREATE TABLE IF NOT EXISTS movie_countries (
            movie_id TEXT NOT NULL REFERENCES movies(id) ON DELETE CASCADE,
            country_id TEXT NOT NULL REFERENCES countries(id) ON DELETE CASCADE,
            PRIMARY KEY (movie_id, country_id)
        );

        -- Replaced wholesale on every re-import of a movie
        CREATE TABLE IF NOT EXISTS movie_cast (
            id TEXT PRIMARY KEY,
            movie_id TEXT NOT NULL REFERENCES movies(id) ON DELETE CASCADE,
            actor_id TEXT NOT NULL REFERENCES actors(id) ON DELETE CASCADE,
            character TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS movie_sources (
            id TEXT PRIMARY KEY,
            movie_id TEXT NOT NULL REFERENCES movies(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            description TEXT
        );

        -- Exactly one row, id = 1
        CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            kinopoisk_api_token TEXT,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create tables")?;

    create_indexes(pool).await?;

    Ok(())
}

/// Create all database indexes
async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    let indexes = [
        // Import identity resolution
        "CREATE INDEX IF NOT EXISTS idx_movies_external ON movies(external_id) WHERE external_id IS NOT NULL",
        "CREATE INDEX IF NOT EXISTS idx_movies_sort_title ON movies(sort_title)",
        "CREATE INDEX IF NOT EXISTS idx_actors_external ON actors(external_id) WHERE external_id IS NOT NULL",
        "CREATE INDEX IF NOT EXISTS idx_actors_sort_name ON actors(sort_name)",
        "CREATE INDEX IF NOT EXISTS idx_genres_name ON genres(name)",
        "CREATE INDEX IF NOT EXISTS idx_countries_name ON countries(name)",

        // Listing sort orders
        "CREATE INDEX IF NOT EXISTS idx_movies_release ON movies(release_date)",
        "CREATE INDEX IF NOT EXISTS idx_movies_rating ON movies(rating)",
        "CREATE INDEX IF NOT EXISTS idx_movies_votes ON movies(vote_count)",

        // Relationship lookups
        "CREATE INDEX IF NOT EXISTS idx_movie_genres_genre ON movie_genres(genre_id)",
        "CREATE INDEX IF NOT EXISTS idx_movie_countries_country ON movie_countries(country_id)",
        "CREATE INDEX IF NOT EXISTS idx_movie_cast_movie ON movie_cast(movie_id, sort_order)",
        "CREATE INDEX IF NOT EXISTS idx_movie_cast_actor ON movie_cast(actor_id)",
        "CREATE INDEX IF NOT EXISTS idx_movie_sources_movie ON movie_sources(movie_id)",
    ];

    for index_sql in indexes {
        if let Err(e) = sqlx::query(index_sql).execute(pool).await {
            tracing::warn!("Failed to create index: {} - {}", index_sql, e);
        }
    }

    tracing::debug!("Database indexes created/verified");

    Ok(())
}

/// A cast row joined with its actor
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CastEntry {
    pub character: String,
    pub sort_order: i32,
    #[sqlx(flatten)]
    pub actor: Actor,
}

pub async fn get_movie(pool: &SqlitePool, id: &str) -> Result<Option<Movie>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM movies WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_actor(pool: &SqlitePool, id: &str) -> Result<Option<Actor>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM actors WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn movie_genres(pool: &SqlitePool, movie_id: &str) -> Result<Vec<Genre>, sqlx::Error> {
    sqlx::query_as(
        "SELECT g.id, g.name FROM genres g
         INNER JOIN movie_genres mg ON g.id = mg.genre_id
         WHERE mg.movie_id = ?
         ORDER BY g.name",
    )
    .bind(movie_id)
    .fetch_all(pool)
    .await
}

pub async fn movie_countries(
    pool: &SqlitePool,
    movie_id: &str,
) -> Result<Vec<Country>, sqlx::Error> {
    sqlx::query_as(
        "SELECT c.id, c.name FROM countries c
         INNER JOIN movie_countries mc ON c.id = mc.country_id
         WHERE mc.movie_id = ?
         ORDER BY c.name",
    )
    .bind(movie_id)
    .fetch_all(pool)
    .await
}

pub async fn movie_cast(pool: &SqlitePool, movie_id: &str) -> Result<Vec<CastEntry>, sqlx::Error> {
    sqlx::query_as(
        "SELECT c.character, c.sort_order, a.* FROM movie_cast c
         INNER JOIN actors a ON a.id = c.actor_id
         WHERE c.movie_id = ?
         ORDER BY c.sort_order",
    )
    .bind(movie_id)
    .fetch_all(pool)
    .await
}

pub async fn movie_sources(
    pool: &SqlitePool,
    movie_id: &str,
) -> Result<Vec<MovieSource>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM movie_sources WHERE movie_id = ? ORDER BY name")
        .bind(movie_id)
        .fetch_all(pool)
        .await
}

/// Genre ids for a batch of movies, as (movie_id, genre_id) pairs
pub async fn genre_ids_for_movies(
    pool: &SqlitePool,
    movie_ids: &[String],
) -> Result<Vec<(String, String)>, sqlx::Error> {
    if movie_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders: Vec<&str> = movie_ids.iter().map(|_| "?").collect();
    let sql = format!(
        "SELECT movie_id, genre_id FROM movie_genres WHERE movie_id IN ({})",
        placeholders.join(",")
    );

    let mut query = sqlx::query_as::<_, (String, String)>(&sql);
    for id in movie_ids {
        query = query.bind(id);
    }
    query.fetch_all(pool).await
}

/// Point an image column at a stored file. Returns false if the row does not exist.
pub async fn set_image(
    pool: &SqlitePool,
    slot: ImageSlot,
    owner_id: &str,
    relative_path: &str,
) -> Result<bool, sqlx::Error> {
    let sql = match slot {
        ImageSlot::Poster => {
            "UPDATE movies SET poster_image = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?"
        }
        ImageSlot::Backdrop => {
            "UPDATE movies SET backdrop_image = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?"
        }
        ImageSlot::ActorPhoto => "UPDATE actors SET profile_image = ? WHERE id = ?",
    };

    let result = sqlx::query(sql)
        .bind(relative_path)
        .bind(owner_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Single-connection in-memory database with the schema applied
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let pool = test_pool().await;
        migrate(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "actors",
                "countries",
                "genres",
                "movie_cast",
                "movie_countries",
                "movie_genres",
                "movie_sources",
                "movies",
                "settings"
            ]
        );
    }

    #[tokio::test]
    async fn test_settings_rejects_second_row() {
        let pool = test_pool().await;
        sqlx::query("INSERT INTO settings (id) VALUES (1)")
            .execute(&pool)
            .await
            .unwrap();
        let second = sqlx::query("INSERT INTO settings (id) VALUES (2)")
            .execute(&pool)
            .await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_set_image_reports_missing_row() {
        let pool = test_pool().await;
        let updated = set_image(&pool, ImageSlot::Poster, "missing", "posters/x.jpg")
            .await
            .unwrap();
        assert!(!updated);
    }
}
