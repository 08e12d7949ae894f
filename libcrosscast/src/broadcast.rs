//! Multi-platform broadcast orchestration
//!
//! One request fans out into independent per-target futures; outcomes are
//! joined, recorded, and aggregated into a single response that keeps the
//! per-target successes and failures apart. A target that fails never
//! drags the others down with it.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use futures::future::join_all;

use crate::config::Config;
use crate::db::Database;
use crate::error::{CrosscastError, PlatformError, Result};
use crate::files::FileStore;
use crate::platforms::{
    bluesky::BlueskyClient, linkedin::LinkedinClient, mastodon::MastodonClient, rss::RssTarget,
    threads::ThreadsClient, twitter::TwitterClient, Platform,
};
use crate::types::{BroadcastRequest, BroadcastResponse, PostRecord, PostRequest, TargetOutcome};

/// Every platform name a request may target.
pub const KNOWN_PLATFORMS: [&str; 6] = [
    "bluesky",
    "mastodon",
    "twitter",
    "linkedin",
    "threads",
    "rss",
];

fn is_transient_error(error: &CrosscastError) -> bool {
    match error {
        CrosscastError::Platform(platform_error) => platform_error.is_transient(),
        _ => false,
    }
}

/// Post to one platform with up to 3 attempts and exponential backoff
/// (1s, 2s) on transient errors. Permanent errors return immediately.
async fn create_with_retry(
    platform: &dyn Platform,
    request: &PostRequest,
) -> Result<crate::types::PostResponse> {
    let max_attempts = 3;
    let platform_name = platform.name().to_string();

    for attempt in 1..=max_attempts {
        match platform.create_post(request).await {
            Ok(response) => {
                if attempt > 1 {
                    info!(
                        "Successfully posted to {} on attempt {}",
                        platform_name, attempt
                    );
                }
                return Ok(response);
            }
            Err(e) => {
                if is_transient_error(&e) && attempt < max_attempts {
                    let delay_secs = 2_u64.pow(attempt - 1);
                    warn!(
                        "Transient error posting to {} (attempt {}/{}): {}. Retrying in {}s...",
                        platform_name, attempt, max_attempts, e, delay_secs
                    );
                    sleep(Duration::from_secs(delay_secs)).await;
                } else {
                    if attempt == max_attempts {
                        warn!(
                            "Failed to post to {} after {} attempts: {}",
                            platform_name, max_attempts, e
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    Err(PlatformError::Internal(format!(
        "Failed to post to {} after {} attempts",
        platform_name, max_attempts
    ))
    .into())
}

/// Fans a broadcast request out to its targets and aggregates the results.
pub struct Broadcaster {
    platforms: Vec<Box<dyn Platform>>,
    db: Database,
    files: FileStore,
}

impl Broadcaster {
    pub fn new(platforms: Vec<Box<dyn Platform>>, db: Database, files: FileStore) -> Self {
        Self {
            platforms,
            db,
            files,
        }
    }

    /// Names of the platforms that were actually constructed.
    pub fn platform_names(&self) -> Vec<&str> {
        self.platforms.iter().map(|p| p.name()).collect()
    }

    /// Validate the request shape, then launch one future per target and
    /// collect every outcome. Targets that are known but unconfigured get
    /// a 503 outcome; unknown names get a 400 outcome; neither fails the
    /// rest of the broadcast.
    pub async fn broadcast(&self, request: &BroadcastRequest) -> Result<BroadcastResponse> {
        if request.targets.is_empty() {
            return Err(CrosscastError::InvalidInput(
                "At least one target platform is required".to_string(),
            ));
        }

        if request.content.trim().is_empty() && request.images.is_empty() {
            return Err(CrosscastError::InvalidInput(
                "Content cannot be empty".to_string(),
            ));
        }

        // Shared across all targets, so a dangling reference fails the
        // whole request up front rather than each target separately.
        for upload_id in &request.images {
            self.files.get(upload_id).await?;
        }

        let mut targets: Vec<&str> = Vec::new();
        for target in &request.targets {
            if !targets.contains(&target.as_str()) {
                targets.push(target.as_str());
            }
        }

        let post_request = request.post_request();
        let post_id = uuid::Uuid::new_v4().to_string();

        let outcomes = join_all(targets.iter().map(|target| {
            let post_request = &post_request;
            async move {
                match self.platforms.iter().find(|p| p.name() == *target) {
                    Some(platform) => {
                        info!("Posting to platform: {}", target);
                        match create_with_retry(platform.as_ref(), post_request).await {
                            Ok(response) => {
                                info!(
                                    "Successfully posted to {}: {}",
                                    target, response.remote_id
                                );
                                TargetOutcome::ok(response)
                            }
                            Err(e) => {
                                warn!("Failed to post to {}: {}", target, e);
                                TargetOutcome::failed(target, e.status_code(), e.to_string())
                            }
                        }
                    }
                    None if KNOWN_PLATFORMS.contains(target) => TargetOutcome::failed(
                        target,
                        503,
                        format!("Platform {} is not configured", target),
                    ),
                    None => TargetOutcome::failed(
                        target,
                        400,
                        format!("Unknown platform: {}", target),
                    ),
                }
            }
        }))
        .await;

        self.record_outcomes(&post_id, &outcomes).await;

        Ok(BroadcastResponse::new(post_id, outcomes))
    }

    /// One post record per target attempt.
    async fn record_outcomes(&self, post_id: &str, outcomes: &[TargetOutcome]) {
        let now = chrono::Utc::now().timestamp();

        for outcome in outcomes {
            let record = PostRecord {
                id: None,
                post_id: post_id.to_string(),
                platform: outcome.platform.clone(),
                remote_id: outcome.remote_id.clone(),
                remote_url: outcome.remote_url.clone(),
                posted_at: if outcome.success { Some(now) } else { None },
                success: outcome.success,
                error_message: outcome.error.clone(),
            };

            if let Err(e) = self.db.create_post_record(&record).await {
                warn!(
                    "Failed to record result for platform {}: {}",
                    outcome.platform, e
                );
            }
        }
    }
}

/// Create platform adapters for every enabled config section.
///
/// A platform that fails to construct (missing secret file, failed login)
/// is logged and left out; requests naming it get a 503 outcome instead
/// of the server refusing to boot.
pub async fn create_platforms(
    config: &Config,
    db: &Database,
    files: &FileStore,
) -> Vec<Box<dyn Platform>> {
    let mut platforms: Vec<Box<dyn Platform>> = Vec::new();

    if let Some(bluesky_config) = config.bluesky.as_ref().filter(|c| c.enabled) {
        info!("Creating Bluesky platform client");
        match BlueskyClient::from_config(bluesky_config, files.clone()).await {
            Ok(client) => platforms.push(Box::new(client)),
            Err(e) => warn!("Skipping Bluesky: {}", e),
        }
    }

    if let Some(mastodon_config) = config.mastodon.as_ref().filter(|c| c.enabled) {
        info!("Creating Mastodon platform client");
        match MastodonClient::from_config(mastodon_config, files.clone()) {
            Ok(mut client) => {
                // The instance limit is a nicety; the default applies when
                // the instance is unreachable at boot.
                if let Err(e) = client.fetch_instance_info().await {
                    warn!("Could not fetch Mastodon instance info: {}", e);
                }
                platforms.push(Box::new(client));
            }
            Err(e) => warn!("Skipping Mastodon: {}", e),
        }
    }

    if let Some(twitter_config) = config.twitter.as_ref().filter(|c| c.enabled) {
        info!("Creating Twitter platform client");
        match TwitterClient::from_config(twitter_config, db.clone(), files.clone()) {
            Ok(client) => platforms.push(Box::new(client)),
            Err(e) => warn!("Skipping Twitter: {}", e),
        }
    }

    if let Some(linkedin_config) = config.linkedin.as_ref().filter(|c| c.enabled) {
        info!("Creating LinkedIn platform client");
        match LinkedinClient::from_config(linkedin_config, db.clone(), files.clone()) {
            Ok(client) => platforms.push(Box::new(client)),
            Err(e) => warn!("Skipping LinkedIn: {}", e),
        }
    }

    if let Some(threads_config) = config.threads.as_ref().filter(|c| c.enabled) {
        info!("Creating Threads platform client");
        match ThreadsClient::from_config(threads_config, files.clone()) {
            Ok(client) => platforms.push(Box::new(client)),
            Err(e) => warn!("Skipping Threads: {}", e),
        }
    }

    if let Some(rss_config) = config.rss.as_ref().filter(|c| c.enabled) {
        info!("Creating RSS target");
        platforms.push(Box::new(RssTarget::new(
            rss_config,
            &config.server.public_url,
            db.clone(),
            files.clone(),
        )));
    }

    if platforms.is_empty() {
        warn!("No platforms are enabled in configuration");
    } else {
        info!("Created {} platform client(s)", platforms.len());
    }

    platforms
}
