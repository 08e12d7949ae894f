//! Configuration management for Crosscast

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub files: FilesConfig,
    pub bluesky: Option<BlueskyConfig>,
    pub mastodon: Option<MastodonConfig>,
    pub twitter: Option<TwitterConfig>,
    pub linkedin: Option<LinkedinConfig>,
    pub threads: Option<ThreadsConfig>,
    pub rss: Option<RssConfig>,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server binds to, e.g. "127.0.0.1:8420"
    pub bind: String,
    /// Externally reachable base URL, used for file links handed to
    /// platforms that fetch media by URL (Threads, RSS enclosures).
    pub public_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Directory upload bytes are written to.
    pub dir: String,
    /// Uploads larger than this are recompressed until they fit.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Images wider or taller than this are resized down first.
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
}

fn default_max_upload_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_max_dimension() -> u32 {
    2048
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskyConfig {
    pub enabled: bool,
    /// Handle, e.g. "user.bsky.social"
    pub handle: String,
    /// File containing the app password.
    pub app_password_file: String,
}

impl BlueskyConfig {
    pub fn read_app_password(&self) -> Result<String> {
        read_secret_file(&self.app_password_file, "Bluesky app password")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MastodonConfig {
    pub enabled: bool,
    /// Instance host or URL, e.g. "mastodon.social"
    pub instance: String,
    /// File containing the OAuth access token.
    pub token_file: String,
}

impl MastodonConfig {
    pub fn read_token(&self) -> Result<String> {
        read_secret_file(&self.token_file, "Mastodon access token")
    }

    /// Instance URL with an https:// prefix applied when missing.
    pub fn instance_url(&self) -> String {
        if self.instance.starts_with("http://") || self.instance.starts_with("https://") {
            self.instance.clone()
        } else {
            format!("https://{}", self.instance)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterConfig {
    pub enabled: bool,
    pub consumer_key: String,
    /// File containing the consumer secret.
    pub consumer_secret_file: String,
    /// Callback URL registered with the app, e.g.
    /// "http://localhost:8420/api/twitter/callback"
    pub callback_url: String,
}

impl TwitterConfig {
    pub fn read_consumer_secret(&self) -> Result<String> {
        read_secret_file(&self.consumer_secret_file, "Twitter consumer secret")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedinConfig {
    pub enabled: bool,
    pub client_id: String,
    /// File containing the client secret.
    pub client_secret_file: String,
    /// Redirect URI registered with the app, e.g.
    /// "http://localhost:8420/api/linkedin/callback"
    pub redirect_uri: String,
}

impl LinkedinConfig {
    pub fn read_client_secret(&self) -> Result<String> {
        read_secret_file(&self.client_secret_file, "LinkedIn client secret")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadsConfig {
    pub enabled: bool,
    /// Numeric Threads user ID the token belongs to.
    pub user_id: String,
    /// File containing the long-lived access token.
    pub token_file: String,
}

impl ThreadsConfig {
    pub fn read_token(&self) -> Result<String> {
        read_secret_file(&self.token_file, "Threads access token")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssConfig {
    pub enabled: bool,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DefaultsConfig {
    /// Targets used when a broadcast request names none.
    #[serde(default)]
    pub targets: Vec<String>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:8420".to_string(),
                public_url: "http://localhost:8420".to_string(),
            },
            database: DatabaseConfig {
                path: "~/.local/share/crosscast/crosscast.db".to_string(),
            },
            files: FilesConfig {
                dir: "~/.local/share/crosscast/files".to_string(),
                max_upload_bytes: default_max_upload_bytes(),
                max_dimension: default_max_dimension(),
            },
            bluesky: None,
            mastodon: None,
            twitter: None,
            linkedin: None,
            threads: None,
            rss: Some(RssConfig {
                enabled: true,
                title: "Crosscast".to_string(),
                description: "Posts".to_string(),
            }),
            defaults: DefaultsConfig {
                targets: vec!["rss".to_string()],
            },
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosscast").join("config.toml"))
}

/// Read and trim a secret from a file, expanding `~` in the path.
fn read_secret_file(path: &str, what: &str) -> Result<String> {
    let expanded = shellexpand::tilde(path).to_string();
    let secret = std::fs::read_to_string(&expanded)
        .map_err(|e| {
            crate::error::PlatformError::Unconfigured(format!(
                "{} file not found at {}: {}",
                what, expanded, e
            ))
        })?
        .trim()
        .to_string();

    if secret.is_empty() {
        return Err(
            crate::error::PlatformError::Unconfigured(format!("{} file is empty", what)).into(),
        );
    }

    Ok(secret)
}
