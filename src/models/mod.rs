use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// URL prefix under which uploaded images are served
pub const MEDIA_URL_PREFIX: &str = "/media";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Genre {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Country {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Actor {
    pub id: String,
    pub name: String,
    /// Lowercased name used for case-insensitive matching
    #[serde(skip_serializing)]
    pub sort_name: String,
    pub external_id: Option<i64>,
    /// Uploaded photo, relative to the media directory
    pub profile_image: Option<String>,
    /// External photo URL
    pub profile_path: Option<String>,
    pub created_at: String,
}

impl Actor {
    /// Uploaded photo wins over the external URL
    pub fn photo_url(&self) -> Option<String> {
        display_url(self.profile_image.as_deref(), self.profile_path.as_deref())
    }

    pub fn has_photo(&self) -> bool {
        non_empty(self.profile_image.as_deref()).is_some()
            || non_empty(self.profile_path.as_deref()).is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Movie {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing)]
    pub sort_title: String,
    pub original_name: Option<String>,
    pub overview: String,
    pub slogan: Option<String>,
    /// Runtime in minutes
    pub film_length: Option<i32>,
    pub age_rating: Option<i32>,
    pub release_date: NaiveDate,
    pub rating: f64,
    pub vote_count: i64,
    pub poster_image: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_image: Option<String>,
    pub backdrop_path: Option<String>,
    pub kind: String,
    pub external_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Movie {
    pub fn poster_url(&self) -> Option<String> {
        display_url(self.poster_image.as_deref(), self.poster_path.as_deref())
    }

    pub fn backdrop_url(&self) -> Option<String> {
        display_url(self.backdrop_image.as_deref(), self.backdrop_path.as_deref())
    }
}

/// External "where to watch" link
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MovieSource {
    pub id: String,
    pub movie_id: String,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
}

/// The single settings row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Settings {
    pub id: i64,
    #[serde(skip_serializing)]
    pub kinopoisk_api_token: Option<String>,
    pub updated_at: String,
}

/// Which image column an upload targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    Poster,
    Backdrop,
    ActorPhoto,
}

impl ImageSlot {
    /// Subdirectory of the media directory holding this kind of image
    pub fn dir_name(&self) -> &'static str {
        match self {
            ImageSlot::Poster => "posters",
            ImageSlot::Backdrop => "backdrops",
            ImageSlot::ActorPhoto => "actors",
        }
    }
}

/// Key used for case-insensitive matching of titles and names.
/// Full Unicode lowercasing; punctuation and inner whitespace are kept as-is.
pub fn sort_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Resolve a display URL: stored image, then external path, then nothing
pub fn display_url(image: Option<&str>, path: Option<&str>) -> Option<String> {
    if let Some(image) = non_empty(image) {
        return Some(format!(
            "{}/{}",
            MEDIA_URL_PREFIX,
            image.trim_start_matches('/')
        ));
    }
    non_empty(path).map(str::to_string)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_url_prefers_uploaded_image() {
        assert_eq!(
            display_url(Some("posters/a.jpg"), Some("https://img/a.jpg")),
            Some("/media/posters/a.jpg".to_string())
        );
        assert_eq!(
            display_url(None, Some("https://img/a.jpg")),
            Some("https://img/a.jpg".to_string())
        );
        assert_eq!(display_url(Some(""), Some("")), None);
        assert_eq!(display_url(None, None), None);
    }

    #[test]
    fn test_sort_key_folds_cyrillic() {
        assert_eq!(sort_key("  Тёмный Рыцарь "), "тёмный рыцарь");
        assert_eq!(sort_key("The Matrix"), "the matrix");
        // punctuation is not normalized
        assert_ne!(sort_key("Mission: Impossible"), sort_key("Mission Impossible"));
    }

    #[test]
    fn test_actor_has_photo() {
        let mut actor = Actor {
            id: "a".to_string(),
            name: "Киану Ривз".to_string(),
            sort_name: "киану ривз".to_string(),
            external_id: None,
            profile_image: None,
            profile_path: Some("  ".to_string()),
            created_at: String::new(),
        };
        assert!(!actor.has_photo());
        assert_eq!(actor.photo_url(), None);

        actor.profile_image = Some("actors/k.jpg".to_string());
        assert!(actor.has_photo());
        assert_eq!(actor.photo_url(), Some("/media/actors/k.jpg".to_string()));
    }
}
