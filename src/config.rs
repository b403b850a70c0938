// Configuration module for movie-catalog
// Handles XDG-compliant directory paths and TOML configuration file

use serde::Deserialize;
use std::path::PathBuf;

const APP_NAME: &str = "movie-catalog";
const CONFIG_FILENAME: &str = "config.toml";

pub const DEFAULT_KINOPOISK_BASE_URL: &str = "https://kinopoiskapiunofficial.tech/api";

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Server configuration
    pub server: ServerConfig,

    /// Directory paths (overrides XDG defaults)
    pub paths: PathsConfig,

    /// Kinopoisk import configuration
    pub import: ImportConfig,

    /// Uploaded image limits
    pub media: MediaConfig,

    /// Admin API access
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server port (default: 8000)
    pub port: u16,

    /// Bind address (default: 0.0.0.0)
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Override data directory (database location)
    pub data_dir: Option<PathBuf>,

    /// Override cache directory
    pub cache_dir: Option<PathBuf>,

    /// Override config directory
    pub config_dir: Option<PathBuf>,

    /// Override media directory (uploaded posters, backdrops, actor photos)
    pub media_dir: Option<PathBuf>,
}

/// Kinopoisk import settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Fallback API token, used when the settings row holds none
    pub api_token: Option<String>,

    /// API root; film and staff endpoints hang off `/v2.2` and `/v1`
    pub base_url: String,

    /// Per-request timeout in seconds (default: 10)
    pub timeout_secs: u64,

    /// Maximum number of actors attached to an imported movie (default: 20)
    pub cast_limit: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            base_url: DEFAULT_KINOPOISK_BASE_URL.to_string(),
            timeout_secs: 10,
            cast_limit: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Target upper bound for a stored image, in bytes (default: 500 KiB)
    pub max_image_bytes: usize,

    /// Longest side of a stored image, in pixels (default: 1920)
    pub max_image_dimension: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: 512_000,
            max_image_dimension: 1920,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer token required by /admin routes. Admin routes are disabled without one.
    pub token: Option<String>,
}

/// Application paths following XDG Base Directory Specification on Unix
/// On other platforms, falls back to the current directory or platform-specific locations
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for configuration files (config.toml)
    /// XDG: $XDG_CONFIG_HOME/movie-catalog or ~/.config/movie-catalog
    pub config_dir: PathBuf,

    /// Directory for persistent data (database)
    /// XDG: $XDG_DATA_HOME/movie-catalog or ~/.local/share/movie-catalog
    pub data_dir: PathBuf,

    /// Directory for cache files
    /// XDG: $XDG_CACHE_HOME/movie-catalog or ~/.cache/movie-catalog
    pub cache_dir: PathBuf,

    /// Directory for uploaded images, served under /media
    pub media_dir: PathBuf,
}

impl AppPaths {
    /// Create application paths using XDG directories (or fallbacks)
    ///
    /// Priority order:
    /// 1. Environment variables (MOVIE_CATALOG_CONFIG_DIR, MOVIE_CATALOG_DATA_DIR, ...)
    /// 2. Config file overrides
    /// 3. XDG directories (Linux/Unix)
    /// 4. Platform-specific directories (macOS, Windows)
    /// 5. Current directory fallback
    pub fn new(config_overrides: &PathsConfig) -> Self {
        let config_dir = Self::resolve_dir(
            "MOVIE_CATALOG_CONFIG_DIR",
            &config_overrides.config_dir,
            dirs::config_dir(),
            None,
        );
        let data_dir = Self::resolve_dir(
            "MOVIE_CATALOG_DATA_DIR",
            &config_overrides.data_dir,
            dirs::data_dir(),
            None,
        );
        let cache_dir = Self::resolve_dir(
            "MOVIE_CATALOG_CACHE_DIR",
            &config_overrides.cache_dir,
            dirs::cache_dir(),
            Some("cache"),
        );
        // Media lives next to the database unless told otherwise
        let media_dir = std::env::var("MOVIE_CATALOG_MEDIA_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| config_overrides.media_dir.clone())
            .unwrap_or_else(|| data_dir.join("media"));

        Self {
            config_dir,
            data_dir,
            cache_dir,
            media_dir,
        }
    }

    /// Create application paths using current directory (legacy/portable mode)
    /// Useful for development or portable installations
    pub fn current_dir() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            config_dir: cwd.clone(),
            data_dir: cwd.clone(),
            cache_dir: cwd.join("cache"),
            media_dir: cwd.join("media"),
        }
    }

    /// Resolve one directory: env var, then config override, then platform dir,
    /// then the current directory (optionally with a subdirectory).
    fn resolve_dir(
        env_var: &str,
        config_override: &Option<PathBuf>,
        platform_dir: Option<PathBuf>,
        cwd_subdir: Option<&str>,
    ) -> PathBuf {
        if let Ok(path) = std::env::var(env_var) {
            return PathBuf::from(path);
        }

        if let Some(ref path) = config_override {
            return path.clone();
        }

        if let Some(dir) = platform_dir {
            return dir.join(APP_NAME);
        }

        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        match cwd_subdir {
            Some(sub) => cwd.join(sub),
            None => cwd,
        }
    }

    /// Get the database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("catalog.db")
    }

    /// Get the database URL for SQLite
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.database_path().display())
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.config_dir).await?;
        tokio::fs::create_dir_all(&self.data_dir).await?;
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        tokio::fs::create_dir_all(&self.media_dir).await?;
        Ok(())
    }

    /// Log the configured paths
    pub fn log_paths(&self) {
        tracing::info!("Configuration directory: {}", self.config_dir.display());
        tracing::info!("Data directory: {}", self.data_dir.display());
        tracing::info!("Media directory: {}", self.media_dir.display());
        tracing::debug!("Cache directory: {}", self.cache_dir.display());
        tracing::debug!("Database path: {}", self.database_path().display());
    }
}

/// Application configuration - combines TOML file with environment overrides
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Application paths
    pub paths: AppPaths,

    /// Server port
    pub port: u16,

    /// Bind address
    pub bind_address: String,

    /// Kinopoisk import settings (token here is only the fallback)
    pub import: ImportConfig,

    /// Uploaded image limits
    pub media: MediaConfig,

    /// Admin bearer token
    pub admin_token: Option<String>,
}

impl AppConfig {
    /// Load configuration from TOML file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML config file
    /// 3. Default values
    ///
    /// config.toml is read from `config_dir` when given.
    pub fn load(config_dir: Option<&std::path::Path>) -> Self {
        let portable_mode = std::env::var("MOVIE_CATALOG_PORTABLE")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        let config_dir = if let Some(dir) = config_dir {
            dir.to_path_buf()
        } else if portable_mode {
            tracing::info!("Running in portable mode (using current directory)");
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            Self::find_config_dir()
        };

        let config_file = Self::load_config_file(&config_dir);

        let paths = if portable_mode {
            AppPaths::current_dir()
        } else {
            AppPaths::new(&config_file.paths)
        };

        Self::build(config_file, paths)
    }

    /// Find the config directory (for locating config.toml)
    fn find_config_dir() -> PathBuf {
        if let Ok(path) = std::env::var("MOVIE_CATALOG_CONFIG_DIR") {
            return PathBuf::from(path);
        }

        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }

        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Load and parse the TOML config file
    fn load_config_file(config_dir: &std::path::Path) -> ConfigFile {
        let config_path = config_dir.join(CONFIG_FILENAME);

        if !config_path.exists() {
            tracing::debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
            return ConfigFile::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    ConfigFile::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                ConfigFile::default()
            }
        }
    }

    /// Build configuration from config file with environment overrides
    fn build(config_file: ConfigFile, paths: AppPaths) -> Self {
        // Port: env > config > default
        let port = Self::env_port().unwrap_or(config_file.server.port);

        // Bind address: env > config > default
        let bind_address =
            Self::env_bind_address().unwrap_or_else(|| config_file.server.bind_address.clone());

        let mut import = config_file.import;

        // Kinopoisk token: env > config
        if let Some(token) = non_blank_env("KINOPOISK_API_TOKEN") {
            import.api_token = Some(token);
        }
        if let Some(base_url) = non_blank_env("KINOPOISK_BASE_URL") {
            import.base_url = base_url;
        }
        import.api_token = import.api_token.filter(|t| !t.trim().is_empty());

        // Admin token: env > config
        let admin_token = non_blank_env("MOVIE_CATALOG_ADMIN_TOKEN")
            .or(config_file.admin.token)
            .filter(|t| !t.trim().is_empty());

        Self {
            paths,
            port,
            bind_address,
            import,
            media: config_file.media,
            admin_token,
        }
    }

    fn env_port() -> Option<u16> {
        std::env::var("MOVIE_CATALOG_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
    }

    fn env_bind_address() -> Option<String> {
        non_blank_env("MOVIE_CATALOG_BIND_ADDRESS")
    }

    /// Get the database URL, with override from DATABASE_URL env var
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.paths.database_url())
    }

    /// Log configuration status
    pub fn log_config(&self) {
        self.paths.log_paths();
        tracing::info!("Server listening on {}:{}", self.bind_address, self.port);
        tracing::debug!(
            "Kinopoisk API: {} (timeout {}s, cast limit {})",
            self.import.base_url,
            self.import.timeout_secs,
            self.import.cast_limit
        );

        if self.import.api_token.is_some() {
            tracing::info!("Kinopoisk fallback token: configured");
        } else {
            tracing::debug!("Kinopoisk fallback token: not set (settings table must provide one)");
        }

        if self.admin_token.is_none() {
            tracing::info!("Hint: Add [admin] token to config.toml or set MOVIE_CATALOG_ADMIN_TOKEN");
        }
    }
}

fn non_blank_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
