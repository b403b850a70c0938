// Application settings stored in the database (single row, id = 1)

use serde::Serialize;
use sqlx::SqlitePool;

use super::import::ImportError;
use crate::models::Settings;

const SETTINGS_ID: i64 = 1;

/// Where the Kinopoisk token in use came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    Settings,
    Config,
}

/// Get the settings row, creating it on first access
pub async fn load(pool: &SqlitePool) -> Result<Settings, sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO settings (id) VALUES (?)")
        .bind(SETTINGS_ID)
        .execute(pool)
        .await?;

    sqlx::query_as("SELECT * FROM settings WHERE id = ?")
        .bind(SETTINGS_ID)
        .fetch_one(pool)
        .await
}

/// Store (or clear, with None/blank) the Kinopoisk API token
pub async fn set_api_token(
    pool: &SqlitePool,
    token: Option<&str>,
) -> Result<Settings, sqlx::Error> {
    load(pool).await?;

    let token = token.map(str::trim).filter(|t| !t.is_empty());

    sqlx::query(
        "UPDATE settings SET kinopoisk_api_token = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(token)
    .bind(SETTINGS_ID)
    .execute(pool)
    .await?;

    if token.is_some() {
        tracing::info!("Kinopoisk API token updated");
    } else {
        tracing::info!("Kinopoisk API token cleared");
    }

    load(pool).await
}

/// The token to use and its origin: the settings row first, then the configured fallback
pub async fn api_token(
    pool: &SqlitePool,
    fallback: Option<&str>,
) -> Result<Option<(String, TokenSource)>, sqlx::Error> {
    let settings = load(pool).await?;

    if let Some(token) = settings
        .kinopoisk_api_token
        .filter(|t| !t.trim().is_empty())
    {
        return Ok(Some((token, TokenSource::Settings)));
    }

    Ok(fallback
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| (t.to_string(), TokenSource::Config)))
}

/// Like [`api_token`], but a missing token is a configuration error
pub async fn resolve_api_token(
    pool: &SqlitePool,
    fallback: Option<&str>,
) -> Result<String, ImportError> {
    api_token(pool, fallback)
        .await?
        .map(|(token, _)| token)
        .ok_or(ImportError::Configuration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn test_load_creates_single_row() {
        let pool = db::test_pool().await;

        let first = load(&pool).await.unwrap();
        let second = load(&pool).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 1);
        assert!(first.kinopoisk_api_token.is_none());

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM settings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_stored_token_wins_over_fallback() {
        let pool = db::test_pool().await;
        set_api_token(&pool, Some(" stored ")).await.unwrap();

        let (token, source) = api_token(&pool, Some("from-config")).await.unwrap().unwrap();
        assert_eq!(token, "stored");
        assert_eq!(source, TokenSource::Settings);
    }

    #[tokio::test]
    async fn test_fallback_used_when_row_empty() {
        let pool = db::test_pool().await;
        set_api_token(&pool, Some("stored")).await.unwrap();
        set_api_token(&pool, Some("   ")).await.unwrap();

        let (token, source) = api_token(&pool, Some("from-config")).await.unwrap().unwrap();
        assert_eq!(token, "from-config");
        assert_eq!(source, TokenSource::Config);
    }

    #[tokio::test]
    async fn test_missing_token_is_configuration_error() {
        let pool = db::test_pool().await;
        let result = resolve_api_token(&pool, Some("")).await;
        assert!(matches!(result, Err(ImportError::Configuration)));
    }
}
