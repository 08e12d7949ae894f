//! LinkedIn platform implementation
//!
//! OAuth2 authorization-code flow with refresh tokens; the token blob and
//! the member URN it was issued for live in the documents store. Images
//! use the registered-upload flow: ask the assets API for an upload URL,
//! PUT the bytes there, then reference the returned asset URN from the
//! UGC post.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};

use crate::config::LinkedinConfig;
use crate::db::Database;
use crate::error::{request_error, PlatformError, Result};
use crate::files::FileStore;
use crate::platforms::{compose_text, Platform};
use crate::types::{PostRequest, PostResponse};

const AUTHORIZATION_URL: &str = "https://www.linkedin.com/oauth/v2/authorization";
const ACCESS_TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
const USERINFO_URL: &str = "https://api.linkedin.com/v2/userinfo";
const REGISTER_UPLOAD_URL: &str = "https://api.linkedin.com/v2/assets?action=registerUpload";
const UGC_POSTS_URL: &str = "https://api.linkedin.com/v2/ugcPosts";
const OAUTH_SCOPE: &str = "openid profile w_member_social";

const OAUTH_TOKEN_KIND: &str = "oauth-token";
const OAUTH_STATE_KIND: &str = "oauth-state";

/// Tokens expiring within this window are refreshed before use.
const EXPIRY_SLACK_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedinToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp the access token expires at.
    pub expires_at: i64,
    /// Member URN posts are authored as, e.g. "urn:li:person:abc123".
    pub person_urn: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

#[derive(Clone)]
pub struct LinkedinClient {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    http: reqwest::Client,
    db: Database,
    files: FileStore,
}

impl LinkedinClient {
    pub fn from_config(config: &LinkedinConfig, db: Database, files: FileStore) -> Result<Self> {
        let client_secret = config.read_client_secret()?;
        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret,
            redirect_uri: config.redirect_uri.clone(),
            http: reqwest::Client::new(),
            db,
            files,
        })
    }

    // ========================================================================
    // OAuth2 flow
    // ========================================================================

    /// Generate a state nonce, park it, and return the authorization URL.
    pub async fn begin_authorization(&self) -> Result<String> {
        let state = uuid::Uuid::new_v4().to_string();
        self.db
            .put_document(OAUTH_STATE_KIND, &state, r#"{"platform":"linkedin"}"#)
            .await?;

        Ok(format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&state={}&scope={}",
            AUTHORIZATION_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            state,
            urlencoding::encode(OAUTH_SCOPE),
        ))
    }

    /// Verify the state nonce, exchange the code, resolve the member URN,
    /// and persist the token blob.
    pub async fn complete_authorization(&self, code: &str, state: &str) -> Result<LinkedinToken> {
        if self
            .db
            .get_document(OAUTH_STATE_KIND, state)
            .await?
            .is_none()
        {
            return Err(PlatformError::Authentication(
                "Unknown or expired LinkedIn OAuth state".to_string(),
            )
            .into());
        }
        self.db.delete_document(OAUTH_STATE_KIND, state).await?;

        let token_response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("redirect_uri", &self.redirect_uri),
            ])
            .await?;

        let person_urn = self.fetch_person_urn(&token_response.access_token).await?;

        let token = LinkedinToken {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
            expires_at: chrono::Utc::now().timestamp() + token_response.expires_in,
            person_urn,
        };
        self.store_token(&token).await?;

        Ok(token)
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(ACCESS_TOKEN_URL)
            .form(form)
            .send()
            .await
            .map_err(|e| network_error("token exchange", e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| network_error("token exchange", e))?;
        if !(200..300).contains(&status) {
            return Err(request_error("linkedin", status, body).into());
        }

        serde_json::from_str(&body)
            .map_err(|e| bad_response(&format!("token response did not parse: {}", e)).into())
    }

    async fn fetch_person_urn(&self, access_token: &str) -> Result<String> {
        let response = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| network_error("userinfo", e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| network_error("userinfo", e))?;
        if !(200..300).contains(&status) {
            return Err(request_error("linkedin", status, body).into());
        }

        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| bad_response(&format!("userinfo did not parse: {}", e)))?;
        let sub = json["sub"]
            .as_str()
            .ok_or_else(|| bad_response("userinfo response missing sub"))?;

        Ok(format!("urn:li:person:{}", sub))
    }

    async fn store_token(&self, token: &LinkedinToken) -> Result<()> {
        self.db
            .put_document(
                OAUTH_TOKEN_KIND,
                "linkedin",
                &serde_json::to_string(token)
                    .map_err(|e| PlatformError::Internal(e.to_string()))?,
            )
            .await
    }

    /// Stored token, refreshed first when it is about to expire.
    async fn current_token(&self) -> Result<LinkedinToken> {
        let blob = self
            .db
            .get_document(OAUTH_TOKEN_KIND, "linkedin")
            .await?
            .ok_or_else(|| {
                PlatformError::Authentication(
                    "No LinkedIn account connected; authorize via /api/linkedin/login first"
                        .to_string(),
                )
            })?;
        let token: LinkedinToken = serde_json::from_str(&blob)
            .map_err(|e| PlatformError::Internal(format!("Corrupt LinkedIn token blob: {}", e)))?;

        if token.expires_at > chrono::Utc::now().timestamp() + EXPIRY_SLACK_SECS {
            return Ok(token);
        }

        let Some(refresh_token) = token.refresh_token.clone() else {
            return Err(PlatformError::Authentication(
                "LinkedIn access token expired and no refresh token is stored; re-authorize"
                    .to_string(),
            )
            .into());
        };

        tracing::debug!("Refreshing expired LinkedIn access token");
        let refreshed = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", &refresh_token),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ])
            .await?;

        let token = LinkedinToken {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token.or(Some(refresh_token)),
            expires_at: chrono::Utc::now().timestamp() + refreshed.expires_in,
            person_urn: token.person_urn,
        };
        self.store_token(&token).await?;

        Ok(token)
    }

    // ========================================================================
    // Media + post creation
    // ========================================================================

    /// Registered-upload flow: obtain an upload URL and asset URN, then
    /// PUT the bytes. Returns the asset URN.
    async fn upload_image(&self, token: &LinkedinToken, upload_id: &str) -> Result<String> {
        let (upload, bytes) = self.files.load(upload_id).await?;

        let register_body = serde_json::json!({
            "registerUploadRequest": {
                "recipes": ["urn:li:digitalmediaRecipe:feedshare-image"],
                "owner": token.person_urn,
                "serviceRelationships": [{
                    "relationshipType": "OWNER",
                    "identifier": "urn:li:userGeneratedContent",
                }],
            }
        });

        let response = self
            .http
            .post(REGISTER_UPLOAD_URL)
            .bearer_auth(&token.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&register_body)
            .send()
            .await
            .map_err(|e| network_error("register upload", e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| network_error("register upload", e))?;
        if !(200..300).contains(&status) {
            return Err(request_error("linkedin", status, body).into());
        }

        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| bad_response(&format!("register upload did not parse: {}", e)))?;
        let upload_url = json["value"]["uploadMechanism"]
            ["com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest"]["uploadUrl"]
            .as_str()
            .ok_or_else(|| bad_response("register upload response missing uploadUrl"))?
            .to_string();
        let asset = json["value"]["asset"]
            .as_str()
            .ok_or_else(|| bad_response("register upload response missing asset"))?
            .to_string();

        let put_response = self
            .http
            .put(&upload_url)
            .bearer_auth(&token.access_token)
            .header(CONTENT_TYPE, upload.mime_type.as_str())
            .body(bytes)
            .send()
            .await
            .map_err(|e| network_error("upload bytes", e))?;

        let put_status = put_response.status().as_u16();
        if !(200..300).contains(&put_status) {
            let body = put_response.text().await.unwrap_or_default();
            return Err(request_error("linkedin", put_status, body).into());
        }

        Ok(asset)
    }
}

#[async_trait]
impl Platform for LinkedinClient {
    fn name(&self) -> &str {
        "linkedin"
    }

    fn character_limit(&self) -> Option<usize> {
        Some(3000)
    }

    fn max_images(&self) -> usize {
        9
    }

    fn is_configured(&self) -> bool {
        !self.client_id.is_empty()
    }

    async fn create_post(&self, request: &PostRequest) -> Result<PostResponse> {
        self.validate_request(request)?;

        let token = self.current_token().await?;

        let (category, media, text) = if !request.images.is_empty() {
            // Images occupy the media slot; a link rides along in the text.
            let mut media = Vec::with_capacity(request.images.len());
            for upload_id in &request.images {
                let alt_text = self.files.get(upload_id).await?.alt_text.unwrap_or_default();
                let asset = self.upload_image(&token, upload_id).await?;
                media.push(serde_json::json!({
                    "status": "READY",
                    "description": { "text": alt_text },
                    "media": asset,
                    "title": { "text": "" },
                }));
            }
            (
                "IMAGE",
                media,
                compose_text(&request.content, request.link.as_deref()),
            )
        } else if let Some(link) = request.link.as_deref() {
            (
                "ARTICLE",
                vec![serde_json::json!({
                    "status": "READY",
                    "originalUrl": link,
                })],
                request.content.clone(),
            )
        } else {
            ("NONE", vec![], request.content.clone())
        };

        let mut share_content = serde_json::json!({
            "shareCommentary": { "text": text },
            "shareMediaCategory": category,
        });
        if !media.is_empty() {
            share_content["media"] = serde_json::Value::Array(media);
        }

        let body = serde_json::json!({
            "author": token.person_urn,
            "lifecycleState": "PUBLISHED",
            "specificContent": { "com.linkedin.ugc.ShareContent": share_content },
            "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" },
        });

        let response = self
            .http
            .post(UGC_POSTS_URL)
            .bearer_auth(&token.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error("create post", e))?;

        let status = response.status().as_u16();
        let restli_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|value| value.to_str().ok())
            .map(String::from);
        let body = response
            .text()
            .await
            .map_err(|e| network_error("create post", e))?;
        if !(200..300).contains(&status) {
            return Err(request_error("linkedin", status, body).into());
        }

        let remote_id = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|json| json["id"].as_str().map(String::from))
            .or(restli_id)
            .ok_or_else(|| bad_response("create post response carried no id"))?;

        let remote_url = Some(format!(
            "https://www.linkedin.com/feed/update/{}",
            remote_id
        ));

        Ok(PostResponse {
            platform: self.name().to_string(),
            remote_id,
            remote_url,
        })
    }
}

fn network_error(context: &str, error: reqwest::Error) -> PlatformError {
    PlatformError::Network(format!("LinkedIn request failed ({}): {}", context, error))
}

fn bad_response(detail: &str) -> PlatformError {
    PlatformError::Internal(format!("Unexpected LinkedIn response: {}", detail))
}
