//! Error types for Crosscast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosscastError>;

#[derive(Error, Debug)]
pub enum CrosscastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CrosscastError {
    /// HTTP status code this error surfaces as.
    pub fn status_code(&self) -> u16 {
        match self {
            CrosscastError::InvalidInput(_) => 400,
            CrosscastError::Platform(platform_error) => platform_error.status_code(),
            CrosscastError::Config(_) => 500,
            CrosscastError::Database(_) => 500,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors produced by platform adapters.
///
/// Every variant maps to one HTTP status so a broadcast can aggregate
/// per-target failures and surface the worst one.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Platform not configured: {0}")]
    Unconfigured(String),

    #[error("Downstream request failed with status {status}: {body}")]
    Request { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlatformError {
    /// HTTP status code this error surfaces as.
    ///
    /// Downstream request errors keep the status the remote API returned.
    pub fn status_code(&self) -> u16 {
        match self {
            PlatformError::Validation(_) => 400,
            PlatformError::Authentication(_) => 401,
            PlatformError::RateLimit(_) => 429,
            PlatformError::Request { status, .. } => *status,
            PlatformError::Network(_) => 502,
            PlatformError::Unconfigured(_) => 503,
            PlatformError::Internal(_) => 500,
        }
    }

    /// Whether a retry with backoff is worth attempting.
    pub fn is_transient(&self) -> bool {
        match self {
            PlatformError::Network(_) | PlatformError::RateLimit(_) => true,
            PlatformError::Request { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

/// Build a `PlatformError` from a downstream HTTP response.
///
/// 401/403 become authentication errors and 429 a rate limit error so the
/// retry and status logic can distinguish them; everything else keeps the
/// remote status and body.
pub fn request_error(platform: &str, status: u16, body: String) -> PlatformError {
    match status {
        401 | 403 => PlatformError::Authentication(format!(
            "{} rejected the credentials (HTTP {}): {}",
            platform, status, body
        )),
        429 => PlatformError::RateLimit(format!("{} rate limit (HTTP 429): {}", platform, body)),
        _ => PlatformError::Request { status, body },
    }
}
