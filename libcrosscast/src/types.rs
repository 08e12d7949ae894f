//! Core types for Crosscast

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A post as persisted for the document/RSS target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub content: String,
    pub link: Option<String>,
    pub language: Option<String>,
    /// Upload UUIDs referenced by this post, in display order.
    pub images: Vec<String>,
    pub created_at: i64,
}

impl Post {
    pub fn from_request(request: &PostRequest) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: request.content.clone(),
            link: request.link.clone(),
            language: request.language.clone(),
            images: request.images.clone(),
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// What a client asks a single platform adapter to publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRequest {
    pub content: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    /// Upload UUIDs to attach.
    #[serde(default)]
    pub images: Vec<String>,
}

/// A broadcast request: one post, many targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub content: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    /// Empty means "use the configured default targets".
    #[serde(default)]
    pub targets: Vec<String>,
}

impl BroadcastRequest {
    pub fn post_request(&self) -> PostRequest {
        PostRequest {
            content: self.content.clone(),
            link: self.link.clone(),
            language: self.language.clone(),
            images: self.images.clone(),
        }
    }
}

/// What a platform adapter returns on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostResponse {
    pub platform: String,
    /// Platform-specific post ID (AT URI, status ID, tweet ID, URN, ...).
    pub remote_id: String,
    /// Human-viewable URL when the platform exposes one.
    pub remote_url: Option<String>,
}

/// Per-target outcome row, one per (post, platform) attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: Option<i64>,
    pub post_id: String,
    pub platform: String,
    pub remote_id: Option<String>,
    pub remote_url: Option<String>,
    pub posted_at: Option<i64>,
    pub success: bool,
    pub error_message: Option<String>,
}

// ============================================================================
// Upload types
// ============================================================================

/// Supported image MIME types for uploads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMimeType {
    /// Parse MIME type from a MIME string (e.g., "image/jpeg")
    pub fn from_mime_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Sniff the MIME type from magic bytes.
    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(Self::Png)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(Self::WebP)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }
}

impl std::fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored image upload.
///
/// The bytes live on disk under the files directory, named by `id`; this
/// struct is the metadata every adapter dereferences before re-uploading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// SHA-256 hash of the stored bytes (hex encoded)
    pub content_hash: String,
    pub mime_type: ImageMimeType,
    pub width: u32,
    pub height: u32,
    /// Optional alt text for accessibility
    pub alt_text: Option<String>,
    pub byte_size: u64,
    pub created_at: i64,
}

// ============================================================================
// Broadcast aggregation
// ============================================================================

/// Outcome of one target within a broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub platform: String,
    pub success: bool,
    /// HTTP-style status for this target (200 on success).
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TargetOutcome {
    pub fn ok(response: PostResponse) -> Self {
        Self {
            platform: response.platform,
            success: true,
            status: 200,
            remote_id: Some(response.remote_id),
            remote_url: response.remote_url,
            error: None,
        }
    }

    pub fn failed(platform: &str, status: u16, error: String) -> Self {
        Self {
            platform: platform.to_string(),
            success: false,
            status,
            remote_id: None,
            remote_url: None,
            error: Some(error),
        }
    }
}

/// Aggregate response for a broadcast: every per-target outcome plus the
/// worst failure status (200 when everything succeeded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub post_id: String,
    pub status: u16,
    pub results: Vec<TargetOutcome>,
}

impl BroadcastResponse {
    pub fn new(post_id: String, results: Vec<TargetOutcome>) -> Self {
        let status = results
            .iter()
            .filter(|outcome| !outcome.success)
            .map(|outcome| outcome.status)
            .max()
            .unwrap_or(200);
        Self {
            post_id,
            status,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_from_request_generates_uuid() {
        let request = PostRequest {
            content: "Test content".to_string(),
            link: None,
            language: None,
            images: vec![],
        };
        let post = Post::from_request(&request);

        let uuid = uuid::Uuid::parse_str(&post.id).expect("post ID should be a valid UUID");
        assert_eq!(uuid.get_version(), Some(uuid::Version::Random));
        assert_eq!(post.content, "Test content");
    }

    #[test]
    fn test_post_from_request_unique_ids() {
        let request = PostRequest {
            content: "Content".to_string(),
            link: None,
            language: None,
            images: vec![],
        };
        let a = Post::from_request(&request);
        let b = Post::from_request(&request);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_post_from_request_copies_fields() {
        let request = PostRequest {
            content: "Hello".to_string(),
            link: Some("https://example.com".to_string()),
            language: Some("en".to_string()),
            images: vec!["u-1".to_string(), "u-2".to_string()],
        };
        let post = Post::from_request(&request);
        assert_eq!(post.link.as_deref(), Some("https://example.com"));
        assert_eq!(post.language.as_deref(), Some("en"));
        assert_eq!(post.images, vec!["u-1", "u-2"]);
        assert!(post.created_at > 1_600_000_000);
    }

    #[test]
    fn test_broadcast_request_post_request() {
        let request = BroadcastRequest {
            content: "Hi".to_string(),
            link: None,
            language: Some("de".to_string()),
            images: vec!["u-1".to_string()],
            targets: vec!["mastodon".to_string(), "rss".to_string()],
        };
        let post_request = request.post_request();
        assert_eq!(post_request.content, "Hi");
        assert_eq!(post_request.language.as_deref(), Some("de"));
        assert_eq!(post_request.images, vec!["u-1"]);
    }

    #[test]
    fn test_broadcast_request_deserialization_defaults() {
        let request: BroadcastRequest =
            serde_json::from_str(r#"{"content":"hi","targets":["rss"]}"#).unwrap();
        assert_eq!(request.content, "hi");
        assert!(request.link.is_none());
        assert!(request.images.is_empty());
        assert_eq!(request.targets, vec!["rss"]);
    }

    #[test]
    fn test_image_mime_type_from_mime_str() {
        assert_eq!(
            ImageMimeType::from_mime_str("image/jpeg"),
            Some(ImageMimeType::Jpeg)
        );
        assert_eq!(
            ImageMimeType::from_mime_str("image/jpg"),
            Some(ImageMimeType::Jpeg)
        );
        assert_eq!(
            ImageMimeType::from_mime_str("IMAGE/PNG"),
            Some(ImageMimeType::Png)
        );
        assert_eq!(
            ImageMimeType::from_mime_str("image/webp"),
            Some(ImageMimeType::WebP)
        );
        assert_eq!(ImageMimeType::from_mime_str("text/plain"), None);
        assert_eq!(ImageMimeType::from_mime_str("video/mp4"), None);
    }

    #[test]
    fn test_image_mime_type_from_magic_jpeg() {
        let bytes = [0xFF, 0xD8, 0xFF, 0xE0, 0x00];
        assert_eq!(ImageMimeType::from_magic(&bytes), Some(ImageMimeType::Jpeg));
    }

    #[test]
    fn test_image_mime_type_from_magic_png() {
        let bytes = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(ImageMimeType::from_magic(&bytes), Some(ImageMimeType::Png));
    }

    #[test]
    fn test_image_mime_type_from_magic_gif() {
        assert_eq!(
            ImageMimeType::from_magic(b"GIF89a......"),
            Some(ImageMimeType::Gif)
        );
        assert_eq!(
            ImageMimeType::from_magic(b"GIF87a......"),
            Some(ImageMimeType::Gif)
        );
    }

    #[test]
    fn test_image_mime_type_from_magic_webp() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(b"WEBP");
        assert_eq!(ImageMimeType::from_magic(&bytes), Some(ImageMimeType::WebP));
    }

    #[test]
    fn test_image_mime_type_from_magic_unknown() {
        assert_eq!(ImageMimeType::from_magic(b"not an image"), None);
        assert_eq!(ImageMimeType::from_magic(&[]), None);
    }

    #[test]
    fn test_image_mime_type_as_str_and_extension() {
        assert_eq!(ImageMimeType::Jpeg.as_str(), "image/jpeg");
        assert_eq!(ImageMimeType::Jpeg.extension(), "jpg");
        assert_eq!(ImageMimeType::Png.as_str(), "image/png");
        assert_eq!(ImageMimeType::WebP.extension(), "webp");
        assert_eq!(format!("{}", ImageMimeType::Gif), "image/gif");
    }

    #[test]
    fn test_target_outcome_ok() {
        let outcome = TargetOutcome::ok(PostResponse {
            platform: "mastodon".to_string(),
            remote_id: "12345".to_string(),
            remote_url: Some("https://mastodon.social/@u/12345".to_string()),
        });
        assert!(outcome.success);
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.remote_id.as_deref(), Some("12345"));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_target_outcome_failed() {
        let outcome = TargetOutcome::failed("twitter", 503, "not configured".to_string());
        assert!(!outcome.success);
        assert_eq!(outcome.status, 503);
        assert!(outcome.remote_id.is_none());
        assert_eq!(outcome.error.as_deref(), Some("not configured"));
    }

    #[test]
    fn test_broadcast_response_all_success() {
        let response = BroadcastResponse::new(
            "post-1".to_string(),
            vec![
                TargetOutcome::ok(PostResponse {
                    platform: "rss".to_string(),
                    remote_id: "post-1".to_string(),
                    remote_url: None,
                }),
                TargetOutcome::ok(PostResponse {
                    platform: "mastodon".to_string(),
                    remote_id: "9".to_string(),
                    remote_url: None,
                }),
            ],
        );
        assert_eq!(response.status, 200);
    }

    #[test]
    fn test_broadcast_response_surfaces_worst_status() {
        let response = BroadcastResponse::new(
            "post-1".to_string(),
            vec![
                TargetOutcome::ok(PostResponse {
                    platform: "rss".to_string(),
                    remote_id: "post-1".to_string(),
                    remote_url: None,
                }),
                TargetOutcome::failed("twitter", 401, "no token".to_string()),
                TargetOutcome::failed("threads", 503, "not configured".to_string()),
            ],
        );
        assert_eq!(response.status, 503);
    }

    #[test]
    fn test_broadcast_response_empty_results() {
        let response = BroadcastResponse::new("post-1".to_string(), vec![]);
        assert_eq!(response.status, 200);
        assert!(response.results.is_empty());
    }

    #[test]
    fn test_broadcast_response_serialization_skips_empty_fields() {
        let response = BroadcastResponse::new(
            "post-1".to_string(),
            vec![TargetOutcome::failed("bluesky", 400, "too long".to_string())],
        );
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"error\""));
        assert!(!json.contains("\"remote_id\""));
    }
}
