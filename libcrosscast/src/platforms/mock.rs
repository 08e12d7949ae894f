//! Mock platform implementation for testing
//!
//! A configurable target that can simulate successes, every failure kind,
//! and latency. Integration tests use it to verify broadcast fan-out and
//! aggregation without credentials or network access.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::Platform;
use crate::types::{PostRequest, PostResponse};

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform name (e.g., "mock-mastodon")
    pub name: String,

    /// Error returned by `create_post`; `None` means success.
    pub post_error: Option<PlatformError>,

    /// Errors returned before the first success, for retry tests.
    pub transient_failures: usize,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Character limit for validation
    pub character_limit: Option<usize>,

    /// Whether the platform reports itself configured
    pub is_configured: bool,

    /// Number of times create_post has been called
    pub post_call_count: Arc<Mutex<usize>>,

    /// Requests that reached create_post (for verification)
    pub posted_requests: Arc<Mutex<Vec<PostRequest>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            post_error: None,
            transient_failures: 0,
            delay: Duration::from_millis(0),
            character_limit: None,
            is_configured: true,
            post_call_count: Arc::new(Mutex::new(0)),
            posted_requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock platform for testing
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// A target that always succeeds.
    pub fn succeeding(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// A target that always fails with the given error.
    pub fn failing(name: &str, error: PlatformError) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            post_error: Some(error),
            ..Default::default()
        })
    }

    /// A target that fails with a network error `failures` times, then
    /// succeeds.
    pub fn flaky(name: &str, failures: usize) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            transient_failures: failures,
            ..Default::default()
        })
    }

    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    pub fn with_limit(name: &str, limit: usize) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            character_limit: Some(limit),
            ..Default::default()
        })
    }

    pub fn post_call_count(&self) -> usize {
        *self.config.post_call_count.lock().unwrap()
    }

    pub fn posted_requests(&self) -> Vec<PostRequest> {
        self.config.posted_requests.lock().unwrap().clone()
    }

    /// Shared handles for asserting after the platform is boxed away.
    pub fn handles(&self) -> (Arc<Mutex<usize>>, Arc<Mutex<Vec<PostRequest>>>) {
        (
            self.config.post_call_count.clone(),
            self.config.posted_requests.clone(),
        )
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn character_limit(&self) -> Option<usize> {
        self.config.character_limit
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured
    }

    async fn create_post(&self, request: &PostRequest) -> Result<PostResponse> {
        let attempt = {
            let mut count = self.config.post_call_count.lock().unwrap();
            *count += 1;
            *count
        };

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if attempt <= self.config.transient_failures {
            return Err(
                PlatformError::Network("Mock transient network error".to_string()).into(),
            );
        }

        if let Some(error) = &self.config.post_error {
            return Err(error.clone().into());
        }

        self.config
            .posted_requests
            .lock()
            .unwrap()
            .push(request.clone());

        Ok(PostResponse {
            platform: self.config.name.clone(),
            remote_id: format!("{}:mock-{}", self.config.name, uuid::Uuid::new_v4()),
            remote_url: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(content: &str) -> PostRequest {
        PostRequest {
            content: content.to_string(),
            link: None,
            language: None,
            images: vec![],
        }
    }

    #[tokio::test]
    async fn test_mock_success() {
        let platform = MockPlatform::succeeding("test");

        assert!(platform.is_configured());
        assert_eq!(platform.name(), "test");
        assert_eq!(platform.character_limit(), None);

        let response = platform.create_post(&request("Test content")).await.unwrap();
        assert!(response.remote_id.starts_with("test:mock-"));
        assert_eq!(platform.post_call_count(), 1);

        let posted = platform.posted_requests();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].content, "Test content");
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let platform = MockPlatform::failing(
            "test",
            PlatformError::Authentication("Invalid credentials".to_string()),
        );

        let result = platform.create_post(&request("Test")).await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid credentials"));
        assert!(platform.posted_requests().is_empty());
    }

    #[tokio::test]
    async fn test_mock_flaky_succeeds_after_failures() {
        let platform = MockPlatform::flaky("test", 2);

        assert!(platform.create_post(&request("a")).await.is_err());
        assert!(platform.create_post(&request("a")).await.is_err());
        assert!(platform.create_post(&request("a")).await.is_ok());
        assert_eq!(platform.post_call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_with_delay() {
        let platform = MockPlatform::with_delay("test", Duration::from_millis(50));

        let start = std::time::Instant::now();
        platform.create_post(&request("Test")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_mock_with_character_limit() {
        let platform = MockPlatform::with_limit("test", 10);

        assert_eq!(platform.character_limit(), Some(10));
        assert!(platform.validate_request(&request("Short")).is_ok());

        let result = platform.validate_request(&request("This is way too long"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("character limit"));
    }

    #[test]
    fn test_mock_not_configured() {
        let platform = MockPlatform::new(MockConfig {
            name: "test".to_string(),
            is_configured: false,
            ..Default::default()
        });
        assert!(!platform.is_configured());
    }
}
