use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// Define error types for config loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

// Result type alias for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Config structs for archiver.toml
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Paths {
    pub content_root: String,
    pub database_file: String,
    pub lock_file: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Fetch {
    pub page_size: usize,
    /// Pages fetched per poll once a user has a watermark.
    pub pages_with_watermark: usize,
    /// Pages fetched for a user that has never been polled. Kept shallow so a
    /// newly-discovered account pulls a recent window, not its full history.
    pub pages_without_watermark: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Http {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub download_retries: usize,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Discovery {
    /// Subreddits scanned for new authors when a round-robin cycle completes.
    pub subreddits: Vec<String>,
    /// Listing window passed to the top endpoint ("day", "week", "month").
    pub window: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub paths: Paths,
    pub fetch: Fetch,
    pub http: Http,
    pub discovery: Discovery,
}

// Default implementation for AppConfig
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: Paths {
                content_root: "./content".to_string(),
                database_file: "./archiver.sqlite".to_string(),
                lock_file: "./reddit_archiver.lock".to_string(),
            },
            fetch: Fetch {
                page_size: 100,
                pages_with_watermark: 10,
                pages_without_watermark: 1,
            },
            http: Http {
                user_agent: "reddit_archiver/1.0".to_string(),
                timeout_secs: 30,
                download_retries: 3,
                retry_delay_ms: 1000,
            },
            discovery: Discovery {
                subreddits: vec!["gonewild".to_string()],
                window: "week".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Loads the config from `path`, writing the default config there first
    /// if no file exists yet.
    pub fn load_or_create(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            let config = Self::default();
            fs::write(path, toml::to_string_pretty(&config)?)?;
            return Ok(config);
        }
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
