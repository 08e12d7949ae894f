//! Mastodon platform implementation
//!
//! Uses the megalodon library, so any Fediverse server speaking the
//! Mastodon API works (Pleroma, GoToSocial, Akkoma, ...). Media uploads
//! go through the instance's media endpoint; large files come back as
//! async attachments that must be polled until the instance finishes
//! processing them.

use async_trait::async_trait;
use megalodon::{Megalodon, SNS};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::config::MastodonConfig;
use crate::error::{PlatformError, Result};
use crate::files::FileStore;
use crate::platforms::{compose_text, Platform};
use crate::types::{PostRequest, PostResponse};

/// How often and how long to poll an async media attachment.
const MEDIA_POLL_ATTEMPTS: usize = 10;
const MEDIA_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct MastodonClient {
    client: Box<dyn Megalodon + Send + Sync>,
    files: FileStore,
    /// Character limit for posts (instance-specific)
    character_limit: usize,
}

impl MastodonClient {
    /// Create a client for an instance with a bearer token.
    ///
    /// The character limit starts at the Mastodon default of 500; call
    /// `fetch_instance_info` to pick up the instance's real limit.
    pub fn new(instance_url: String, access_token: String, files: FileStore) -> Result<Self> {
        let client = megalodon::generator(SNS::Mastodon, instance_url, Some(access_token), None)
            .map_err(|e| {
                PlatformError::Unconfigured(format!("Failed to create Mastodon client: {:?}", e))
            })?;

        Ok(Self {
            client,
            files,
            character_limit: 500,
        })
    }

    /// Create a client from configuration, reading the token file.
    pub fn from_config(config: &MastodonConfig, files: FileStore) -> Result<Self> {
        let token = config.read_token()?;
        Self::new(config.instance_url(), token, files)
    }

    /// Verify the token against the instance.
    pub async fn verify_credentials(&self) -> Result<()> {
        self.client
            .verify_account_credentials()
            .await
            .map_err(|e| map_megalodon_error(e, "verify credentials"))?;
        Ok(())
    }

    /// Query the instance for its posting limits.
    pub async fn fetch_instance_info(&mut self) -> Result<()> {
        let response = self
            .client
            .get_instance()
            .await
            .map_err(|e| map_megalodon_error(e, "fetch instance info"))?;

        let limit = response.json.configuration.statuses.max_characters;
        self.character_limit = limit as usize;

        Ok(())
    }

    /// Upload one stored image and wait for the instance to process it.
    async fn upload_image(&self, upload_id: &str) -> Result<String> {
        let upload = self.files.get(upload_id).await?;
        let path = self.files.file_path(upload_id);

        let options = megalodon::megalodon::UploadMediaInputOptions {
            description: upload.alt_text.clone(),
            ..Default::default()
        };

        let response = self
            .client
            .upload_media(path.to_string_lossy().into_owned(), Some(&options))
            .await
            .map_err(|e| map_megalodon_error(e, "upload media"))?;

        match response.json {
            megalodon::entities::UploadMedia::Attachment(attachment) => Ok(attachment.id),
            megalodon::entities::UploadMedia::AsyncAttachment(pending) => {
                self.await_processing(pending.id).await
            }
        }
    }

    /// Poll an async attachment until the instance reports it ready.
    /// The media endpoint errors while processing is still in flight.
    async fn await_processing(&self, media_id: String) -> Result<String> {
        for attempt in 1..=MEDIA_POLL_ATTEMPTS {
            sleep(MEDIA_POLL_INTERVAL).await;

            match self.client.get_media(media_id.clone()).await {
                Ok(response) => {
                    debug!("Mastodon media {} ready after {} poll(s)", media_id, attempt);
                    return Ok(response.json.id);
                }
                Err(e) if attempt == MEDIA_POLL_ATTEMPTS => {
                    return Err(map_megalodon_error(e, "poll media processing").into());
                }
                Err(_) => continue,
            }
        }

        Err(PlatformError::Network(format!(
            "Mastodon media {} still processing after {} polls",
            media_id, MEDIA_POLL_ATTEMPTS
        ))
        .into())
    }
}

#[async_trait]
impl Platform for MastodonClient {
    fn name(&self) -> &str {
        "mastodon"
    }

    fn character_limit(&self) -> Option<usize> {
        Some(self.character_limit)
    }

    fn is_configured(&self) -> bool {
        // Client construction already required instance and token.
        true
    }

    async fn create_post(&self, request: &PostRequest) -> Result<PostResponse> {
        self.validate_request(request)?;

        let mut media_ids = Vec::with_capacity(request.images.len());
        for upload_id in &request.images {
            media_ids.push(self.upload_image(upload_id).await?);
        }

        let text = compose_text(&request.content, request.link.as_deref());
        let options = megalodon::megalodon::PostStatusInputOptions {
            media_ids: if media_ids.is_empty() {
                None
            } else {
                Some(media_ids)
            },
            language: request.language.clone(),
            ..Default::default()
        };

        let response = self
            .client
            .post_status(text, Some(&options))
            .await
            .map_err(|e| map_megalodon_error(e, "post status"))?;

        let (remote_id, remote_url) = match response.json {
            megalodon::megalodon::PostStatusOutput::Status(status) => (status.id, status.url),
            megalodon::megalodon::PostStatusOutput::ScheduledStatus(scheduled) => {
                (scheduled.id, None)
            }
        };

        Ok(PostResponse {
            platform: self.name().to_string(),
            remote_id,
            remote_url,
        })
    }
}

/// Map megalodon errors to PlatformError.
///
/// The megalodon error type doesn't expose a structured status, so the
/// status code is recovered from the error text when present; downstream
/// statuses are preserved in `Request` so the broadcast surfaces them.
fn map_megalodon_error(error: megalodon::error::Error, context: &str) -> PlatformError {
    let error_str = error.to_string();
    let error_lower = error_str.to_lowercase();

    match extract_http_status(&error_str) {
        Some(401) | Some(403) => PlatformError::Authentication(format!(
            "Mastodon rejected the access token ({}): {}",
            context, error_str
        )),
        Some(429) => PlatformError::RateLimit(format!(
            "Mastodon rate limit ({}): {}",
            context, error_str
        )),
        Some(status) => PlatformError::Request {
            status,
            body: format!("Mastodon {} failed: {}", context, error_str),
        },
        None => {
            if error_lower.contains("unauthorized")
                || error_lower.contains("forbidden")
                || error_lower.contains("token")
            {
                PlatformError::Authentication(format!(
                    "Mastodon authentication failed ({}): {}",
                    context, error_str
                ))
            } else if error_lower.contains("rate limit")
                || error_lower.contains("too many requests")
            {
                PlatformError::RateLimit(format!(
                    "Mastodon rate limit ({}): {}",
                    context, error_str
                ))
            } else if error_lower.contains("parse")
                || error_lower.contains("json")
                || error_lower.contains("deserialize")
            {
                PlatformError::Internal(format!(
                    "Mastodon response parse error ({}): {}",
                    context, error_str
                ))
            } else {
                PlatformError::Network(format!("Mastodon error ({}): {}", context, error_str))
            }
        }
    }
}

/// Extract an HTTP status code from an error message string.
///
/// Looks for patterns like "HTTP 401", "status 403", "401:", etc.
fn extract_http_status(error_str: &str) -> Option<u16> {
    let prefixes = ["HTTP ", "status ", "code: ", "status_code: "];

    for prefix in &prefixes {
        if let Some(pos) = error_str.find(prefix) {
            let after_prefix = &error_str[pos + prefix.len()..];
            if let Some(code_str) = after_prefix.get(0..3) {
                if let Ok(code) = code_str.parse::<u16>() {
                    if (100..=599).contains(&code) {
                        return Some(code);
                    }
                }
            }
        }
    }

    // Standalone 3-digit codes followed by ':' or ' '
    for (i, window) in error_str.as_bytes().windows(4).enumerate() {
        if window[0].is_ascii_digit()
            && window[1].is_ascii_digit()
            && window[2].is_ascii_digit()
            && (window[3] == b':' || window[3] == b' ')
        {
            if let Ok(code_str) = std::str::from_utf8(&window[0..3]) {
                if let Ok(code) = code_str.parse::<u16>() {
                    if (100..=599).contains(&code)
                        && (i == 0 || !error_str.as_bytes()[i - 1].is_ascii_digit())
                    {
                        return Some(code);
                    }
                }
            }
        }
    }

    None
}
