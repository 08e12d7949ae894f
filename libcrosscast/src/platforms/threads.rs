//! Meta Threads platform implementation
//!
//! The Graph API posts in two steps: create a media container, then
//! publish it. Threads fetches images itself by URL, so containers point
//! at the file store's public URLs instead of carrying bytes. Multiple
//! images become carousel item containers wrapped in a CAROUSEL container.

use async_trait::async_trait;
use tracing::warn;

use crate::config::ThreadsConfig;
use crate::error::{request_error, PlatformError, Result};
use crate::files::FileStore;
use crate::platforms::{compose_text, Platform};
use crate::types::{PostRequest, PostResponse};

const GRAPH_URL: &str = "https://graph.threads.net/v1.0";

pub struct ThreadsClient {
    user_id: String,
    access_token: String,
    http: reqwest::Client,
    files: FileStore,
}

impl ThreadsClient {
    pub fn new(user_id: String, access_token: String, files: FileStore) -> Self {
        Self {
            user_id,
            access_token,
            http: reqwest::Client::new(),
            files,
        }
    }

    pub fn from_config(config: &ThreadsConfig, files: FileStore) -> Result<Self> {
        let access_token = config.read_token()?;
        Ok(Self::new(config.user_id.clone(), access_token, files))
    }

    /// POST one Graph endpoint with form params plus the access token and
    /// return the `id` field of the JSON response.
    async fn graph_post(&self, path: &str, params: &[(&str, String)], context: &str) -> Result<String> {
        let url = format!("{}/{}", GRAPH_URL, path);

        let mut form: Vec<(&str, String)> = params.to_vec();
        form.push(("access_token", self.access_token.clone()));

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| network_error(context, e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| network_error(context, e))?;
        if !(200..300).contains(&status) {
            return Err(request_error("threads", status, body).into());
        }

        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| bad_response(&format!("{} returned invalid JSON: {}", context, e)))?;
        json["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| bad_response(&format!("{} response missing id", context)).into())
    }

    /// One container per image; carousel items are flagged as such.
    async fn create_image_container(
        &self,
        upload_id: &str,
        text: Option<&str>,
        carousel_item: bool,
    ) -> Result<String> {
        let upload = self.files.get(upload_id).await?;

        let mut params = vec![
            ("media_type", "IMAGE".to_string()),
            ("image_url", self.files.public_url(upload_id)),
        ];
        if let Some(alt_text) = upload.alt_text {
            params.push(("alt_text", alt_text));
        }
        if carousel_item {
            params.push(("is_carousel_item", "true".to_string()));
        }
        if let Some(text) = text {
            params.push(("text", text.to_string()));
        }

        self.graph_post(
            &format!("{}/threads", self.user_id),
            &params,
            "create image container",
        )
        .await
    }

    async fn publish(&self, creation_id: String) -> Result<String> {
        self.graph_post(
            &format!("{}/threads_publish", self.user_id),
            &[("creation_id", creation_id)],
            "publish",
        )
        .await
    }

    /// Permalink lookup is best-effort; the post stands without it.
    async fn fetch_permalink(&self, thread_id: &str) -> Option<String> {
        let url = format!(
            "{}/{}?fields=permalink&access_token={}",
            GRAPH_URL, thread_id, self.access_token
        );
        let response = self.http.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let json: serde_json::Value = response.json().await.ok()?;
        json["permalink"].as_str().map(String::from)
    }
}

#[async_trait]
impl Platform for ThreadsClient {
    fn name(&self) -> &str {
        "threads"
    }

    fn character_limit(&self) -> Option<usize> {
        Some(500)
    }

    fn max_images(&self) -> usize {
        10
    }

    fn is_configured(&self) -> bool {
        !self.user_id.is_empty() && !self.access_token.is_empty()
    }

    async fn create_post(&self, request: &PostRequest) -> Result<PostResponse> {
        self.validate_request(request)?;

        let text = compose_text(&request.content, request.link.as_deref());

        let creation_id = match request.images.len() {
            0 => {
                let mut params = vec![
                    ("media_type", "TEXT".to_string()),
                    ("text", request.content.clone()),
                ];
                // Text posts get a real link attachment instead of a bare
                // URL pasted into the text.
                if let Some(link) = request.link.as_deref() {
                    params.push(("link_attachment", link.to_string()));
                }
                self.graph_post(
                    &format!("{}/threads", self.user_id),
                    &params,
                    "create text container",
                )
                .await?
            }
            1 => {
                self.create_image_container(&request.images[0], Some(&text), false)
                    .await?
            }
            _ => {
                let mut children = Vec::with_capacity(request.images.len());
                for upload_id in &request.images {
                    children.push(self.create_image_container(upload_id, None, true).await?);
                }
                self.graph_post(
                    &format!("{}/threads", self.user_id),
                    &[
                        ("media_type", "CAROUSEL".to_string()),
                        ("children", children.join(",")),
                        ("text", text.clone()),
                    ],
                    "create carousel container",
                )
                .await?
            }
        };

        let thread_id = self.publish(creation_id).await?;

        let remote_url = self.fetch_permalink(&thread_id).await;
        if remote_url.is_none() {
            warn!("Could not resolve permalink for Threads post {}", thread_id);
        }

        Ok(PostResponse {
            platform: self.name().to_string(),
            remote_id: thread_id,
            remote_url,
        })
    }
}

fn network_error(context: &str, error: reqwest::Error) -> PlatformError {
    PlatformError::Network(format!("Threads request failed ({}): {}", context, error))
}

fn bad_response(detail: &str) -> PlatformError {
    PlatformError::Internal(format!("Unexpected Threads response: {}", detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_client() -> (ThreadsClient, TempDir) {
        let temp = TempDir::new().unwrap();
        let db = crate::db::Database::new(":memory:").await.unwrap();
        let files = FileStore::new(
            &crate::config::FilesConfig {
                dir: temp.path().to_str().unwrap().to_string(),
                max_upload_bytes: 1024 * 1024,
                max_dimension: 2048,
            },
            "https://posts.example.com",
            db,
        )
        .unwrap();
        (
            ThreadsClient::new("17841400000000000".to_string(), "token".to_string(), files),
            temp,
        )
    }

    #[tokio::test]
    async fn test_platform_trait_methods() {
        let (client, _temp) = test_client().await;
        assert_eq!(client.name(), "threads");
        assert_eq!(client.character_limit(), Some(500));
        assert_eq!(client.max_images(), 10);
        assert!(client.is_configured());
    }

    #[tokio::test]
    async fn test_not_configured_without_token() {
        let temp = TempDir::new().unwrap();
        let db = crate::db::Database::new(":memory:").await.unwrap();
        let files = FileStore::new(
            &crate::config::FilesConfig {
                dir: temp.path().to_str().unwrap().to_string(),
                max_upload_bytes: 1024 * 1024,
                max_dimension: 2048,
            },
            "https://posts.example.com",
            db,
        )
        .unwrap();

        let client = ThreadsClient::new("17841400000000000".to_string(), String::new(), files);
        assert!(!client.is_configured());
    }

    #[tokio::test]
    async fn test_validation_rejects_over_limit() {
        let (client, _temp) = test_client().await;
        let request = PostRequest {
            content: "a".repeat(501),
            link: None,
            language: None,
            images: vec![],
        };
        assert!(client.validate_request(&request).is_err());
    }

    #[tokio::test]
    async fn test_validation_rejects_too_many_images() {
        let (client, _temp) = test_client().await;
        let request = PostRequest {
            content: "carousel".to_string(),
            link: None,
            language: None,
            images: (0..11).map(|i| format!("img-{}", i)).collect(),
        };
        assert!(client.validate_request(&request).is_err());
    }

    #[tokio::test]
    async fn test_image_containers_point_at_public_urls() {
        let (client, _temp) = test_client().await;
        // Threads fetches by URL, so the container must reference the
        // externally reachable file endpoint.
        assert_eq!(
            client.files.public_url("some-uuid"),
            "https://posts.example.com/api/files/some-uuid"
        );
    }

    #[tokio::test]
    async fn test_from_config_missing_token_file() {
        let (_, temp) = test_client().await;
        let db = crate::db::Database::new(":memory:").await.unwrap();
        let files = FileStore::new(
            &crate::config::FilesConfig {
                dir: temp.path().to_str().unwrap().to_string(),
                max_upload_bytes: 1024 * 1024,
                max_dimension: 2048,
            },
            "https://posts.example.com",
            db,
        )
        .unwrap();

        let config = ThreadsConfig {
            enabled: true,
            user_id: "17841400000000000".to_string(),
            token_file: "/nonexistent/threads.token".to_string(),
        };
        let result = ThreadsClient::from_config(&config, files);
        assert!(matches!(
            result,
            Err(crate::error::CrosscastError::Platform(
                PlatformError::Unconfigured(_)
            ))
        ));
    }
}
