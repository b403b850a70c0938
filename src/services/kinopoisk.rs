// Kinopoisk metadata provider
// API Documentation: https://kinopoiskapiunofficial.tech/documentation/api/

use regex::Regex;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

use super::import::ImportError;

/// Film and series page URLs, e.g. https://www.kinopoisk.ru/film/435/
static RE_FILM_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)kinopoisk\.ru/(?:film|series)/(\d+)").unwrap());

/// Kinopoisk API client
pub struct KinopoiskClient {
    client: Client,
    api_token: String,
    base_url: String,
}

/// Film details from /v2.2/films/{id}
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilmData {
    pub kinopoisk_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub name_ru: Option<String>,
    pub name_original: Option<String>,
    pub name_en: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub slogan: Option<String>,
    pub year: Option<i32>,
    pub premiere_world: Option<String>,
    pub premiere_ru: Option<String>,
    pub rating_kinopoisk: Option<f64>,
    pub rating_imdb: Option<f64>,
    pub rating_kinopoisk_vote_count: Option<i64>,
    pub rating_imdb_vote_count: Option<i64>,
    pub poster_url: Option<String>,
    pub cover_url: Option<String>,
    pub rating_age_limits: Option<String>,
    pub film_length: Option<i32>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub genres: Vec<GenreRef>,
    #[serde(default)]
    pub countries: Vec<CountryRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenreRef {
    #[serde(default)]
    pub genre: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountryRef {
    #[serde(default)]
    pub country: String,
}

/// One entry of /v1/staff?filmId={id}
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffEntry {
    pub staff_id: Option<i64>,
    pub name_ru: Option<String>,
    pub name_en: Option<String>,
    /// Character name for actors
    pub description: Option<String>,
    pub poster_url: Option<String>,
    pub profession_key: Option<String>,
}

impl StaffEntry {
    pub fn is_actor(&self) -> bool {
        self.profession_key.as_deref() == Some("ACTOR")
    }
}

/// Extract the numeric film id from a Kinopoisk film or series URL
pub fn extract_id(url: &str) -> Result<i64, ImportError> {
    RE_FILM_URL
        .captures(url)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .ok_or_else(|| ImportError::InvalidUrl(url.to_string()))
}

impl KinopoiskClient {
    /// Create a new Kinopoisk client
    pub fn new(api_token: String, base_url: &str, timeout: Duration) -> Result<Self, ImportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ImportError::Network)?;

        Ok(Self {
            client,
            api_token,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.client
            .get(url)
            .header("X-API-KEY", &self.api_token)
            .header("Content-Type", "application/json")
    }

    /// Get film details. Every failure here aborts the import.
    pub async fn fetch_metadata(&self, film_id: i64) -> Result<FilmData, ImportError> {
        let url = format!("{}/v2.2/films/{}", self.base_url, film_id);
        tracing::debug!("Fetching Kinopoisk film: {}", url);

        let response = self.get(&url).send().await.map_err(ImportError::Network)?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => return Err(ImportError::Unauthorized),
            StatusCode::NOT_FOUND => return Err(ImportError::NotFound(film_id)),
            status => {
                return Err(ImportError::Upstream {
                    status: status.as_u16(),
                })
            }
        }

        response
            .json::<FilmData>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ImportError::Network(e)
                } else {
                    ImportError::InvalidPayload(e)
                }
            })
    }

    /// Get the staff listing. Callers treat failures as "cast unavailable".
    pub async fn fetch_cast(&self, film_id: i64) -> Result<Vec<StaffEntry>, ImportError> {
        let url = format!("{}/v1/staff", self.base_url);

        let response = self
            .get(&url)
            .query(&[("filmId", film_id)])
            .send()
            .await
            .map_err(ImportError::Network)?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => return Err(ImportError::Unauthorized),
            status => {
                return Err(ImportError::Upstream {
                    status: status.as_u16(),
                })
            }
        }

        response
            .json::<Vec<StaffEntry>>()
            .await
            .map_err(ImportError::InvalidPayload)
    }

    /// Fetch film details and staff concurrently; waits for both.
    /// Staff is None when the listing could not be fetched.
    pub async fn fetch_film(
        &self,
        film_id: i64,
    ) -> Result<(FilmData, Option<Vec<StaffEntry>>), ImportError> {
        let (metadata, staff) =
            tokio::join!(self.fetch_metadata(film_id), self.fetch_cast(film_id));

        let staff = match staff {
            Ok(staff) => Some(staff),
            Err(e) => {
                tracing::warn!("Kinopoisk staff for film {} unavailable: {}", film_id, e);
                None
            }
        };

        Ok((metadata?, staff))
    }
}
