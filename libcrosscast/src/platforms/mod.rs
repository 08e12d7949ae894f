//! Platform abstraction and implementations
//!
//! One module per target. Each adapter wraps a single platform's
//! authentication, media-upload, and post-creation sequence behind the
//! same contract: validate the request, translate stored uploads into
//! platform media references, assemble the text, and fire one
//! authenticated create call, mapping failures into `PlatformError`.

use async_trait::async_trait;

use crate::error::{PlatformError, Result};
use crate::types::{PostRequest, PostResponse};

pub mod bluesky;
pub mod linkedin;
pub mod mastodon;
pub mod rss;
pub mod threads;
pub mod twitter;

// Mock platform is available for all builds (not just tests) to support
// integration tests.
pub mod mock;

/// Unified contract for post targets.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Lowercase identifier ("bluesky", "mastodon", "twitter", "linkedin",
    /// "threads", "rss").
    fn name(&self) -> &str;

    /// Maximum characters per post, or `None` when the platform has no
    /// hard limit.
    fn character_limit(&self) -> Option<usize>;

    /// Maximum number of attached images per post.
    fn max_images(&self) -> usize {
        4
    }

    /// Whether the adapter has everything it needs to attempt a post.
    fn is_configured(&self) -> bool;

    /// Check the request against platform limits before any network call.
    ///
    /// The default covers empty content, the character limit applied to
    /// the composed text (content plus appended link), and the image
    /// count. Adapters with platform-specific rules override this.
    fn validate_request(&self, request: &PostRequest) -> Result<()> {
        if request.content.trim().is_empty() && request.images.is_empty() {
            return Err(
                PlatformError::Validation("Content cannot be empty".to_string()).into(),
            );
        }

        if let Some(limit) = self.character_limit() {
            let text = compose_text(&request.content, request.link.as_deref());
            let char_count = text.chars().count();
            if char_count > limit {
                return Err(PlatformError::Validation(format!(
                    "Content exceeds {}'s {} character limit (current: {} characters)",
                    self.name(),
                    limit,
                    char_count
                ))
                .into());
            }
        }

        if request.images.len() > self.max_images() {
            return Err(PlatformError::Validation(format!(
                "{} allows at most {} images per post (requested: {})",
                self.name(),
                self.max_images(),
                request.images.len()
            ))
            .into());
        }

        Ok(())
    }

    /// Publish the post and return the platform-specific reference.
    async fn create_post(&self, request: &PostRequest) -> Result<PostResponse>;
}

/// Post text with the link appended, for platforms without a dedicated
/// link slot. The link is skipped when the content already contains it.
pub fn compose_text(content: &str, link: Option<&str>) -> String {
    match link {
        Some(link) if !link.is_empty() && !content.contains(link) => {
            if content.trim().is_empty() {
                link.to_string()
            } else {
                format!("{}\n\n{}", content.trim_end(), link)
            }
        }
        _ => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockPlatform;

    fn request(content: &str, link: Option<&str>, images: usize) -> PostRequest {
        PostRequest {
            content: content.to_string(),
            link: link.map(String::from),
            language: None,
            images: (0..images).map(|i| format!("img-{}", i)).collect(),
        }
    }

    #[test]
    fn test_compose_text_appends_link() {
        assert_eq!(
            compose_text("Read this", Some("https://example.com")),
            "Read this\n\nhttps://example.com"
        );
    }

    #[test]
    fn test_compose_text_skips_duplicate_link() {
        assert_eq!(
            compose_text("See https://example.com now", Some("https://example.com")),
            "See https://example.com now"
        );
    }

    #[test]
    fn test_compose_text_without_link() {
        assert_eq!(compose_text("Just words", None), "Just words");
        assert_eq!(compose_text("Just words", Some("")), "Just words");
    }

    #[test]
    fn test_compose_text_link_only() {
        assert_eq!(
            compose_text("   ", Some("https://example.com")),
            "https://example.com"
        );
    }

    #[test]
    fn test_default_validation_empty_content() {
        let platform = MockPlatform::succeeding("mock");
        let result = platform.validate_request(&request("   ", None, 0));
        assert!(result.is_err());
    }

    #[test]
    fn test_default_validation_images_without_text_ok() {
        let platform = MockPlatform::succeeding("mock");
        assert!(platform.validate_request(&request("", None, 1)).is_ok());
    }

    #[test]
    fn test_default_validation_character_limit_counts_composed_text() {
        let platform = MockPlatform::with_limit("mock", 40);
        // 30 chars of content fits, but the appended link pushes it over.
        let result =
            platform.validate_request(&request(&"a".repeat(30), Some("https://example.com"), 0));
        assert!(result.is_err());

        assert!(platform
            .validate_request(&request(&"a".repeat(40), None, 0))
            .is_ok());
    }

    #[test]
    fn test_default_validation_image_count() {
        let platform = MockPlatform::succeeding("mock");
        assert!(platform.validate_request(&request("hi", None, 4)).is_ok());
        let result = platform.validate_request(&request("hi", None, 5));
        assert!(result.is_err());
    }
}
