//! Configuration management
//!
//! Configuration is loaded from `config.yml` and then overridden by
//! `PREPPAL_<SECTION>_<KEY>` environment variables. Missing optional values
//! are filled with defaults so an absent file still yields a runnable server.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub images: ImageHostConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (the SPA)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`.
    /// Only enable behind a reverse proxy that overwrites those headers.
    #[serde(default)]
    pub trust_proxy: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            trust_proxy: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path or `sqlite:` URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/preppal.db".to_string()
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_capacity")]
    pub capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            capacity: default_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    60
}

fn default_capacity() -> u64 {
    10_000
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Session lifetime in days
    #[serde(default = "default_session_days")]
    pub session_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_days: default_session_days(),
        }
    }
}

fn default_session_days() -> i64 {
    7
}

/// Upload limits applied before anything reaches the image host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum file size in bytes (default: 5MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed image MIME types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

fn default_max_file_size() -> u64 {
    5 * 1024 * 1024
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/webp".to_string(),
    ]
}

impl UploadConfig {
    /// Check if a MIME type is allowed
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == mime_type)
    }

    /// Get file extension for a MIME type
    pub fn get_extension(mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "bin",
        }
    }
}

/// Where uploaded images are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageHostDriver {
    /// Local directory served under `/uploads` (default)
    #[default]
    Local,
    /// Cloudinary signed upload API
    Cloudinary,
}

/// Image host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageHostConfig {
    #[serde(default)]
    pub driver: ImageHostDriver,
    /// Directory for the local driver
    #[serde(default = "default_image_path")]
    pub path: PathBuf,
    /// URL prefix the local driver hands out
    #[serde(default = "default_public_base")]
    pub public_base: String,
    #[serde(default)]
    pub cloud_name: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    /// Folder images are placed in on the remote host
    #[serde(default = "default_folder")]
    pub folder: String,
}

impl Default for ImageHostConfig {
    fn default() -> Self {
        Self {
            driver: ImageHostDriver::default(),
            path: default_image_path(),
            public_base: default_public_base(),
            cloud_name: None,
            api_key: None,
            api_secret: None,
            folder: default_folder(),
        }
    }
}

fn default_image_path() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_public_base() -> String {
    "/uploads".to_string()
}

fn default_folder() -> String {
    "preppal".to_string()
}

/// SMTP settings for outgoing mail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// When false, mail is logged instead of sent
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: default_from_address(),
            from_name: default_from_name(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "no-reply@preppal.local".to_string()
}

fn default_from_name() -> String {
    "PrepPAL".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
}

impl Config {
    /// Load configuration from file.
    ///
    /// A missing or empty file yields the default configuration. Invalid
    /// YAML is reported with its line and column.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `PREPPAL_*` environment variable overrides.
    ///
    /// Values that fail to parse are ignored and the file value is kept.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("PREPPAL_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("PREPPAL_SERVER_PORT") {
            self.server.port = port;
        }
        if let Ok(origin) = std::env::var("PREPPAL_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = origin;
        }
        if let Some(trust) = env_parse::<bool>("PREPPAL_SERVER_TRUST_PROXY") {
            self.server.trust_proxy = trust;
        }

        if let Ok(url) = std::env::var("PREPPAL_DATABASE_URL") {
            self.database.url = url;
        }

        if let Some(ttl) = env_parse::<u64>("PREPPAL_CACHE_TTL_SECONDS") {
            self.cache.ttl_seconds = ttl;
        }

        if let Some(days) = env_parse::<i64>("PREPPAL_AUTH_SESSION_DAYS") {
            self.auth.session_days = days;
        }

        if let Some(size) = env_parse::<u64>("PREPPAL_UPLOAD_MAX_FILE_SIZE") {
            self.upload.max_file_size = size;
        }

        if let Ok(driver) = std::env::var("PREPPAL_IMAGES_DRIVER") {
            match driver.to_lowercase().as_str() {
                "local" => self.images.driver = ImageHostDriver::Local,
                "cloudinary" => self.images.driver = ImageHostDriver::Cloudinary,
                _ => {}
            }
        }
        if let Ok(path) = std::env::var("PREPPAL_IMAGES_PATH") {
            self.images.path = PathBuf::from(path);
        }
        if let Ok(name) = std::env::var("PREPPAL_IMAGES_CLOUD_NAME") {
            self.images.cloud_name = Some(name);
        }
        if let Ok(key) = std::env::var("PREPPAL_IMAGES_API_KEY") {
            self.images.api_key = Some(key);
        }
        if let Ok(secret) = std::env::var("PREPPAL_IMAGES_API_SECRET") {
            self.images.api_secret = Some(secret);
        }

        if let Some(enabled) = env_parse::<bool>("PREPPAL_EMAIL_ENABLED") {
            self.email.enabled = enabled;
        }
        if let Ok(host) = std::env::var("PREPPAL_EMAIL_SMTP_HOST") {
            self.email.smtp_host = host;
        }
        if let Some(port) = env_parse::<u16>("PREPPAL_EMAIL_SMTP_PORT") {
            self.email.smtp_port = port;
        }
        if let Ok(username) = std::env::var("PREPPAL_EMAIL_SMTP_USERNAME") {
            self.email.smtp_username = username;
        }
        if let Ok(password) = std::env::var("PREPPAL_EMAIL_SMTP_PASSWORD") {
            self.email.smtp_password = password;
        }
        if let Ok(from) = std::env::var("PREPPAL_EMAIL_FROM_ADDRESS") {
            self.email.from_address = from;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Serialising a config to YAML and loading it back yields the same values.
        #[test]
        fn config_yaml_roundtrip(
            port in 1u16..=65535,
            host in "[a-z0-9.]{1,20}",
            ttl in 1u64..=86_400,
            days in 1i64..=90,
        ) {
            let mut config = Config::default();
            config.server.port = port;
            config.server.host = host.clone();
            config.cache.ttl_seconds = ttl;
            config.auth.session_days = days;

            let yaml = serde_yaml::to_string(&config).unwrap();
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "{}", yaml).unwrap();

            let parsed = Config::load(file.path()).unwrap();
            prop_assert_eq!(parsed.server.port, port);
            prop_assert_eq!(parsed.server.host, host);
            prop_assert_eq!(parsed.cache.ttl_seconds, ttl);
            prop_assert_eq!(parsed.auth.session_days, days);
        }
    }
}
