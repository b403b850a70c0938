use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::models::MEDIA_URL_PREFIX;
use crate::AppState;

mod actors;
mod admin;
pub mod error;
mod genres;
mod movies;

/// Public catalog API, mounted under /api
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/movies", movies::routes())
        .nest("/genres", genres::routes())
        .nest("/countries", genres::country_routes())
        .nest("/actors", actors::routes())
}

/// The whole HTTP application
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", routes());

    // Admin endpoints only exist when a token is configured
    if state.config.admin_token.is_some() {
        app = app.nest("/admin", admin::routes());
    } else {
        tracing::warn!("Admin API disabled: no admin token configured");
    }

    app.nest_service(
        MEDIA_URL_PREFIX,
        ServeDir::new(&state.config.paths.media_dir),
    )
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::config::{AppConfig, AppPaths, ImportConfig, MediaConfig};
    use crate::{db, AppState};

    pub const ADMIN_TOKEN: &str = "admin-secret";

    /// State over an in-memory database; media goes to the returned temp dir
    pub async fn test_state_with(
        admin_token: Option<&str>,
        customize: impl FnOnce(&mut AppConfig),
    ) -> (Arc<AppState>, tempfile::TempDir) {
        let media = tempfile::tempdir().unwrap();
        let root = media.path().to_path_buf();

        let mut config = AppConfig {
            paths: AppPaths {
                config_dir: root.clone(),
                data_dir: root.clone(),
                cache_dir: root.join("cache"),
                media_dir: root.clone(),
            },
            port: 0,
            bind_address: "127.0.0.1".to_string(),
            import: ImportConfig {
                api_token: None,
                ..Default::default()
            },
            media: MediaConfig::default(),
            admin_token: admin_token.map(str::to_string),
        };
        customize(&mut config);

        let state = Arc::new(AppState {
            db: db::test_pool().await,
            config,
        });
        (state, media)
    }

    pub async fn test_state(admin_token: Option<&str>) -> (Arc<AppState>, tempfile::TempDir) {
        test_state_with(admin_token, |_| {}).await
    }

    /// Run one request through the full router; non-JSON bodies read as Null
    pub async fn send(
        state: Arc<AppState>,
        request: Request<Body>,
    ) -> (StatusCode, serde_json::Value) {
        let response = super::router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    pub async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        send(state, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{get_json, send, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    #[tokio::test]
    async fn test_health() {
        let (state, _media) = test_state(None).await;
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(state, request).await;
        assert_eq!(status, StatusCode::OK);
        // plain text, not JSON
        assert_eq!(body, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_media_served_from_media_dir() {
        let (state, media) = test_state(None).await;
        std::fs::create_dir_all(media.path().join("posters")).unwrap();
        std::fs::write(media.path().join("posters/x.jpg"), b"jpeg").unwrap();

        let (status, _) = get_json(state.clone(), "/media/posters/x.jpg").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = get_json(state, "/media/posters/missing.jpg").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
