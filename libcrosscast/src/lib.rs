//! Crosscast - one post request, many platforms
//!
//! This library implements the fan-out core: a broadcast request is
//! validated once, then delivered to each requested target (Bluesky,
//! Mastodon, Twitter, LinkedIn, Threads, and an internally generated RSS
//! feed) through independent platform adapters, with per-target outcomes
//! aggregated into a single response.

pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod files;
pub mod logging;
pub mod platforms;
pub mod types;

// Re-export commonly used types
pub use broadcast::{create_platforms, Broadcaster, KNOWN_PLATFORMS};
pub use config::Config;
pub use db::Database;
pub use error::{CrosscastError, Result};
pub use files::FileStore;
pub use types::{
    BroadcastRequest, BroadcastResponse, Post, PostRecord, PostRequest, PostResponse,
    TargetOutcome, Upload,
};
