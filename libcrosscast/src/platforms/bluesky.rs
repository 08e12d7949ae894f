//! Bluesky platform implementation
//!
//! Posts are AT Protocol records. Images are uploaded as blobs and
//! referenced from an `app.bsky.embed.images` embed; an appended link gets
//! a richtext facet over its UTF-8 byte range so clients render it as a
//! tappable link.

use async_trait::async_trait;
use bsky_sdk::BskyAgent;
use std::num::NonZeroU64;

use bsky_sdk::api::app::bsky::embed::defs::AspectRatioData;
use bsky_sdk::api::app::bsky::embed::images::{ImageData, MainData as ImagesData};
use bsky_sdk::api::app::bsky::feed::post::{RecordData, RecordEmbedRefs};
use bsky_sdk::api::app::bsky::richtext::facet::{
    ByteSliceData, LinkData, MainData as FacetData, MainFeaturesItem,
};
use bsky_sdk::api::types::string::Datetime;
use bsky_sdk::api::types::Union;

use crate::config::BlueskyConfig;
use crate::error::{PlatformError, Result};
use crate::files::FileStore;
use crate::platforms::{compose_text, Platform};
use crate::types::{PostRequest, PostResponse};

pub struct BlueskyClient {
    agent: BskyAgent,
    handle: String,
    files: FileStore,
    authenticated: bool,
}

impl BlueskyClient {
    /// Create an agent and log in with handle + app password.
    pub async fn new(handle: String, app_password: String, files: FileStore) -> Result<Self> {
        let agent = BskyAgent::builder().build().await.map_err(|e| {
            PlatformError::Unconfigured(format!("Failed to create Bluesky agent: {}", e))
        })?;

        agent
            .login(&handle, &app_password)
            .await
            .map_err(|e| map_bluesky_error(e, "authentication"))?;

        tracing::debug!("Bluesky session created for {}", handle);

        Ok(Self {
            agent,
            handle,
            files,
            authenticated: true,
        })
    }

    pub async fn from_config(config: &BlueskyConfig, files: FileStore) -> Result<Self> {
        let app_password = config.read_app_password()?;
        Self::new(config.handle.clone(), app_password, files).await
    }

    /// Upload one stored image as a blob and build its embed entry.
    async fn upload_image(
        &self,
        upload_id: &str,
    ) -> Result<bsky_sdk::api::app::bsky::embed::images::Image> {
        let (upload, bytes) = self.files.load(upload_id).await?;

        let output = self
            .agent
            .api
            .com
            .atproto
            .repo
            .upload_blob(bytes)
            .await
            .map_err(|e| map_bluesky_error(e, "upload blob"))?;

        let aspect_ratio = match (
            NonZeroU64::new(upload.width as u64),
            NonZeroU64::new(upload.height as u64),
        ) {
            (Some(width), Some(height)) => Some(AspectRatioData { width, height }.into()),
            _ => None,
        };

        Ok(ImageData {
            alt: upload.alt_text.unwrap_or_default(),
            aspect_ratio,
            image: output.data.blob,
        }
        .into())
    }
}

#[async_trait]
impl Platform for BlueskyClient {
    fn name(&self) -> &str {
        "bluesky"
    }

    fn character_limit(&self) -> Option<usize> {
        Some(300)
    }

    fn is_configured(&self) -> bool {
        self.authenticated
    }

    async fn create_post(&self, request: &PostRequest) -> Result<PostResponse> {
        if !self.authenticated {
            return Err(PlatformError::Authentication("Not authenticated".to_string()).into());
        }

        self.validate_request(request)?;

        let text = compose_text(&request.content, request.link.as_deref());

        // Link facet over the appended URL's byte range
        let facets = request.link.as_deref().and_then(|link| {
            let byte_start = text.rfind(link)?;
            let facet = FacetData {
                features: vec![Union::Refs(MainFeaturesItem::Link(Box::new(
                    LinkData {
                        uri: link.to_string(),
                    }
                    .into(),
                )))],
                index: ByteSliceData {
                    byte_start,
                    byte_end: byte_start + link.len(),
                }
                .into(),
            };
            Some(vec![facet.into()])
        });

        let embed = if request.images.is_empty() {
            None
        } else {
            let mut images = Vec::with_capacity(request.images.len());
            for upload_id in &request.images {
                images.push(self.upload_image(upload_id).await?);
            }
            Some(Union::Refs(RecordEmbedRefs::AppBskyEmbedImagesMain(
                Box::new(ImagesData { images }.into()),
            )))
        };

        let langs = request
            .language
            .as_ref()
            .and_then(|lang| lang.parse().ok())
            .map(|lang| vec![lang]);

        let record = RecordData {
            created_at: Datetime::now(),
            embed,
            entities: None,
            facets,
            labels: None,
            langs,
            reply: None,
            tags: None,
            text,
        };

        let response = self
            .agent
            .create_record(record)
            .await
            .map_err(|e| map_bluesky_error(e, "create record"))?;

        let at_uri = response.data.uri.clone();
        let remote_url = at_uri
            .rsplit('/')
            .next()
            .map(|rkey| format!("https://bsky.app/profile/{}/post/{}", self.handle, rkey));

        Ok(PostResponse {
            platform: self.name().to_string(),
            remote_id: at_uri,
            remote_url,
        })
    }
}

/// Map Bluesky/AT Protocol errors to PlatformError.
///
/// XRPC errors surface their status and AT Protocol error codes in the
/// message text (e.g. "InvalidRequest", "ExpiredToken"), so classification
/// works over the formatted error.
fn map_bluesky_error<E: std::fmt::Display + std::fmt::Debug>(
    error: E,
    context: &str,
) -> PlatformError {
    let error_msg = format!("{}", error);
    let debug_msg = format!("{:?}", error);

    if error_msg.contains("401")
        || error_msg.contains("403")
        || error_msg.contains("AuthenticationRequired")
        || error_msg.contains("InvalidToken")
        || error_msg.contains("ExpiredToken")
        || error_msg.contains("InvalidCredentials")
        || error_msg.contains("AccountNotFound")
        || debug_msg.contains("Unauthorized")
        || debug_msg.contains("Forbidden")
    {
        return PlatformError::Authentication(format!(
            "Bluesky authentication failed during {}: {}. Check the handle and app password.",
            context, error_msg
        ));
    }

    if error_msg.contains("400")
        || error_msg.contains("InvalidRequest")
        || error_msg.contains("InvalidRecord")
        || error_msg.contains("BlobTooLarge")
        || debug_msg.contains("BadRequest")
    {
        return PlatformError::Validation(format!(
            "Bluesky rejected the request during {}: {}",
            context, error_msg
        ));
    }

    if error_msg.contains("429")
        || error_msg.contains("RateLimitExceeded")
        || debug_msg.contains("RateLimit")
    {
        return PlatformError::RateLimit(format!(
            "Bluesky rate limit exceeded during {}: {}",
            context, error_msg
        ));
    }

    if error_msg.contains("connection")
        || error_msg.contains("network")
        || error_msg.contains("timeout")
        || error_msg.contains("unreachable")
        || error_msg.contains("dns")
        || debug_msg.contains("Connect")
        || debug_msg.contains("Timeout")
    {
        return PlatformError::Network(format!(
            "Network error reaching the Bluesky PDS during {}: {}",
            context, error_msg
        ));
    }

    PlatformError::Internal(format!(
        "Bluesky operation failed during {}: {}",
        context, error_msg
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping_authentication_401() {
        match map_bluesky_error("401 Unauthorized", "create record") {
            PlatformError::Authentication(msg) => {
                assert!(msg.contains("authentication failed"));
                assert!(msg.contains("create record"));
            }
            other => panic!("Expected Authentication error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_mapping_invalid_credentials() {
        match map_bluesky_error("InvalidCredentials: nope", "authentication") {
            PlatformError::Authentication(msg) => {
                assert!(msg.contains("app password"));
            }
            other => panic!("Expected Authentication error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_mapping_expired_token() {
        match map_bluesky_error("ExpiredToken: Access token has expired", "create record") {
            PlatformError::Authentication(_) => {}
            other => panic!("Expected Authentication error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_mapping_validation() {
        match map_bluesky_error("400 Bad Request: InvalidRequest", "create record") {
            PlatformError::Validation(msg) => {
                assert!(msg.contains("rejected the request"));
            }
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_mapping_blob_too_large() {
        match map_bluesky_error("BlobTooLarge: limit is 1000000 bytes", "upload blob") {
            PlatformError::Validation(msg) => {
                assert!(msg.contains("upload blob"));
            }
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_mapping_rate_limit() {
        match map_bluesky_error("429 RateLimitExceeded", "create record") {
            PlatformError::RateLimit(_) => {}
            other => panic!("Expected RateLimit error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_mapping_network() {
        match map_bluesky_error("connection refused: Failed to connect to PDS", "upload blob") {
            PlatformError::Network(msg) => {
                assert!(msg.contains("PDS"));
                assert!(msg.contains("upload blob"));
            }
            other => panic!("Expected Network error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_mapping_preserves_at_protocol_codes() {
        match map_bluesky_error("XRPC Error: InvalidRequest (invalid_post_format)", "create record")
        {
            PlatformError::Validation(msg) => {
                assert!(msg.contains("InvalidRequest"));
                assert!(msg.contains("invalid_post_format"));
            }
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_mapping_default_internal() {
        match map_bluesky_error("Something odd happened", "create record") {
            PlatformError::Internal(msg) => {
                assert!(msg.contains("create record"));
            }
            other => panic!("Expected Internal error, got {:?}", other),
        }
    }

    #[test]
    fn test_link_facet_byte_range_math() {
        // Mirrors the facet construction in create_post: the facet must
        // cover the link's UTF-8 byte range, not its char range.
        let link = "https://example.com";
        let text = compose_text("Höhenmeter 🏔", Some(link));

        let byte_start = text.rfind(link).unwrap();
        let byte_end = byte_start + link.len();

        assert_eq!(&text.as_bytes()[byte_start..byte_end], link.as_bytes());
        assert!(byte_start > "Höhenmeter 🏔".chars().count());
    }
}
