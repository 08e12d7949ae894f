//! Twitter/X platform implementation
//!
//! Every call is OAuth 1.0a signed: HMAC-SHA1 over the RFC 5849 signature
//! base string, consumer credentials from config, user credentials from
//! the documents store (written by the three-legged flow below). Media
//! goes through the v1.1 upload endpoint as signed multipart; the tweet
//! itself is created via the v2 JSON endpoint. Neither body participates
//! in the signature (only form-encoded bodies do under OAuth 1.0a).

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use std::collections::HashMap;
use tracing::warn;

use crate::config::TwitterConfig;
use crate::db::Database;
use crate::error::{request_error, PlatformError, Result};
use crate::files::FileStore;
use crate::platforms::{compose_text, Platform};
use crate::types::{PostRequest, PostResponse};

const REQUEST_TOKEN_URL: &str = "https://api.twitter.com/oauth/request_token";
const AUTHORIZE_URL: &str = "https://api.twitter.com/oauth/authorize";
const ACCESS_TOKEN_URL: &str = "https://api.twitter.com/oauth/access_token";
const MEDIA_UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";
const MEDIA_METADATA_URL: &str = "https://upload.twitter.com/1.1/media/metadata/create.json";
const TWEETS_URL: &str = "https://api.twitter.com/2/tweets";

const OAUTH_TOKEN_KIND: &str = "oauth-token";
const OAUTH_STATE_KIND: &str = "oauth-state";

type HmacSha1 = Hmac<Sha1>;

/// Stored user credentials, one blob for the whole deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterToken {
    pub token: String,
    pub token_secret: String,
    pub screen_name: Option<String>,
}

/// Secret half of a pending request token, parked until the callback.
#[derive(Debug, Serialize, Deserialize)]
struct PendingRequestToken {
    token_secret: String,
}

#[derive(Clone)]
pub struct TwitterClient {
    consumer_key: String,
    consumer_secret: String,
    callback_url: String,
    http: reqwest::Client,
    db: Database,
    files: FileStore,
}

impl TwitterClient {
    pub fn from_config(config: &TwitterConfig, db: Database, files: FileStore) -> Result<Self> {
        let consumer_secret = config.read_consumer_secret()?;
        Ok(Self {
            consumer_key: config.consumer_key.clone(),
            consumer_secret,
            callback_url: config.callback_url.clone(),
            http: reqwest::Client::new(),
            db,
            files,
        })
    }

    // ========================================================================
    // Three-legged OAuth flow
    // ========================================================================

    /// Obtain a request token and return the authorize URL to redirect to.
    pub async fn begin_authorization(&self) -> Result<String> {
        let header = self.authorization_header(
            "POST",
            REQUEST_TOKEN_URL,
            &[("oauth_callback", self.callback_url.as_str())],
            None,
        )?;

        let response = self
            .http
            .post(REQUEST_TOKEN_URL)
            .header(AUTHORIZATION, header)
            .send()
            .await
            .map_err(|e| network_error("request token", e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| network_error("request token", e))?;
        if !(200..300).contains(&status) {
            return Err(request_error("twitter", status, body).into());
        }

        let fields = parse_form_body(&body);
        let token = fields
            .get("oauth_token")
            .ok_or_else(|| bad_response("request token response missing oauth_token"))?;
        let token_secret = fields
            .get("oauth_token_secret")
            .ok_or_else(|| bad_response("request token response missing oauth_token_secret"))?;

        let pending = PendingRequestToken {
            token_secret: token_secret.clone(),
        };
        self.db
            .put_document(
                OAUTH_STATE_KIND,
                token,
                &serde_json::to_string(&pending)
                    .map_err(|e| PlatformError::Internal(e.to_string()))?,
            )
            .await?;

        Ok(format!("{}?oauth_token={}", AUTHORIZE_URL, token))
    }

    /// Exchange the verifier from the callback for an access token and
    /// persist it. Replaces any previously stored token.
    pub async fn complete_authorization(
        &self,
        oauth_token: &str,
        oauth_verifier: &str,
    ) -> Result<TwitterToken> {
        let pending = self
            .db
            .get_document(OAUTH_STATE_KIND, oauth_token)
            .await?
            .ok_or_else(|| {
                PlatformError::Authentication(
                    "Unknown or expired Twitter request token".to_string(),
                )
            })?;
        let pending: PendingRequestToken = serde_json::from_str(&pending)
            .map_err(|e| PlatformError::Internal(format!("Corrupt oauth-state blob: {}", e)))?;

        let header = self.authorization_header(
            "POST",
            ACCESS_TOKEN_URL,
            &[("oauth_verifier", oauth_verifier)],
            Some((oauth_token, &pending.token_secret)),
        )?;

        let response = self
            .http
            .post(ACCESS_TOKEN_URL)
            .header(AUTHORIZATION, header)
            .send()
            .await
            .map_err(|e| network_error("access token", e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| network_error("access token", e))?;
        if !(200..300).contains(&status) {
            return Err(request_error("twitter", status, body).into());
        }

        let fields = parse_form_body(&body);
        let token = TwitterToken {
            token: fields
                .get("oauth_token")
                .cloned()
                .ok_or_else(|| bad_response("access token response missing oauth_token"))?,
            token_secret: fields
                .get("oauth_token_secret")
                .cloned()
                .ok_or_else(|| bad_response("access token response missing oauth_token_secret"))?,
            screen_name: fields.get("screen_name").cloned(),
        };

        self.db.delete_document(OAUTH_STATE_KIND, oauth_token).await?;
        self.db
            .put_document(
                OAUTH_TOKEN_KIND,
                "twitter",
                &serde_json::to_string(&token)
                    .map_err(|e| PlatformError::Internal(e.to_string()))?,
            )
            .await?;

        Ok(token)
    }

    async fn stored_token(&self) -> Result<TwitterToken> {
        let blob = self
            .db
            .get_document(OAUTH_TOKEN_KIND, "twitter")
            .await?
            .ok_or_else(|| {
                PlatformError::Authentication(
                    "No Twitter account connected; authorize via /api/twitter/login first"
                        .to_string(),
                )
            })?;
        serde_json::from_str(&blob)
            .map_err(|e| PlatformError::Internal(format!("Corrupt Twitter token blob: {}", e)).into())
    }

    // ========================================================================
    // Media + tweet creation
    // ========================================================================

    async fn upload_image(&self, token: &TwitterToken, upload_id: &str) -> Result<String> {
        let (upload, bytes) = self.files.load(upload_id).await?;

        let header = self.authorization_header(
            "POST",
            MEDIA_UPLOAD_URL,
            &[],
            Some((&token.token, &token.token_secret)),
        )?;

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(format!("{}.{}", upload.id, upload.mime_type.extension()))
            .mime_str(upload.mime_type.as_str())
            .map_err(|e| PlatformError::Internal(format!("Bad media MIME type: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("media", part);

        let response = self
            .http
            .post(MEDIA_UPLOAD_URL)
            .header(AUTHORIZATION, header)
            .multipart(form)
            .send()
            .await
            .map_err(|e| network_error("media upload", e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| network_error("media upload", e))?;
        if !(200..300).contains(&status) {
            return Err(request_error("twitter", status, body).into());
        }

        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| bad_response(&format!("media upload returned invalid JSON: {}", e)))?;
        let media_id = json["media_id_string"]
            .as_str()
            .ok_or_else(|| bad_response("media upload response missing media_id_string"))?
            .to_string();

        if let Some(alt_text) = upload.alt_text {
            // Alt text is nice-to-have; a metadata failure must not sink
            // the post.
            if let Err(e) = self.set_alt_text(token, &media_id, &alt_text).await {
                warn!("Failed to set Twitter alt text for {}: {}", media_id, e);
            }
        }

        Ok(media_id)
    }

    async fn set_alt_text(
        &self,
        token: &TwitterToken,
        media_id: &str,
        alt_text: &str,
    ) -> Result<()> {
        let header = self.authorization_header(
            "POST",
            MEDIA_METADATA_URL,
            &[],
            Some((&token.token, &token.token_secret)),
        )?;

        let body = serde_json::json!({
            "media_id": media_id,
            "alt_text": { "text": alt_text },
        });

        let response = self
            .http
            .post(MEDIA_METADATA_URL)
            .header(AUTHORIZATION, header)
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error("media metadata", e))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(request_error("twitter", status, body).into());
        }

        Ok(())
    }

    // ========================================================================
    // OAuth 1.0a signing
    // ========================================================================

    fn authorization_header(
        &self,
        method: &str,
        url: &str,
        extra_oauth_params: &[(&str, &str)],
        token: Option<(&str, &str)>,
    ) -> Result<String> {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let timestamp = chrono::Utc::now().timestamp().to_string();

        let mut params: Vec<(String, String)> = vec![
            ("oauth_consumer_key".to_string(), self.consumer_key.clone()),
            ("oauth_nonce".to_string(), nonce),
            (
                "oauth_signature_method".to_string(),
                "HMAC-SHA1".to_string(),
            ),
            ("oauth_timestamp".to_string(), timestamp),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];
        if let Some((token, _)) = token {
            params.push(("oauth_token".to_string(), token.to_string()));
        }
        for (key, value) in extra_oauth_params {
            params.push((key.to_string(), value.to_string()));
        }

        let base = signature_base_string(method, url, &params);
        let token_secret = token.map(|(_, secret)| secret).unwrap_or("");
        let signature = hmac_sha1_signature(&base, &self.consumer_secret, token_secret)?;
        params.push(("oauth_signature".to_string(), signature));

        params.sort();
        let header = params
            .iter()
            .map(|(key, value)| format!("{}=\"{}\"", key, percent_encode(value)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {}", header))
    }
}

#[async_trait]
impl Platform for TwitterClient {
    fn name(&self) -> &str {
        "twitter"
    }

    fn character_limit(&self) -> Option<usize> {
        Some(280)
    }

    fn is_configured(&self) -> bool {
        !self.consumer_key.is_empty()
    }

    async fn create_post(&self, request: &PostRequest) -> Result<PostResponse> {
        self.validate_request(request)?;

        let token = self.stored_token().await?;

        let mut media_ids = Vec::with_capacity(request.images.len());
        for upload_id in &request.images {
            media_ids.push(self.upload_image(&token, upload_id).await?);
        }

        let text = compose_text(&request.content, request.link.as_deref());
        let mut body = serde_json::json!({ "text": text });
        if !media_ids.is_empty() {
            body["media"] = serde_json::json!({ "media_ids": media_ids });
        }

        let header = self.authorization_header(
            "POST",
            TWEETS_URL,
            &[],
            Some((&token.token, &token.token_secret)),
        )?;

        let response = self
            .http
            .post(TWEETS_URL)
            .header(AUTHORIZATION, header)
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error("create tweet", e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| network_error("create tweet", e))?;
        if !(200..300).contains(&status) {
            return Err(request_error("twitter", status, body).into());
        }

        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| bad_response(&format!("create tweet returned invalid JSON: {}", e)))?;
        let tweet_id = json["data"]["id"]
            .as_str()
            .ok_or_else(|| bad_response("create tweet response missing data.id"))?
            .to_string();

        let remote_url = token
            .screen_name
            .as_ref()
            .map(|name| format!("https://twitter.com/{}/status/{}", name, tweet_id));

        Ok(PostResponse {
            platform: self.name().to_string(),
            remote_id: tweet_id,
            remote_url,
        })
    }
}

/// RFC 3986 percent-encoding over the unreserved set, as OAuth 1.0a
/// requires for every signature component.
fn percent_encode(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}

/// `METHOD&encoded-url&encoded-sorted-params` per RFC 5849 §3.4.1.
fn signature_base_string(method: &str, base_url: &str, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(key, value)| (percent_encode(key), percent_encode(value)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(base_url),
        percent_encode(&param_string)
    )
}

fn hmac_sha1_signature(base: &str, consumer_secret: &str, token_secret: &str) -> Result<String> {
    let key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| PlatformError::Internal(format!("HMAC key error: {}", e)))?;
    mac.update(base.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

fn parse_form_body(body: &str) -> HashMap<String, String> {
    body.split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((
                urlencoding::decode(key).ok()?.into_owned(),
                urlencoding::decode(value).ok()?.into_owned(),
            ))
        })
        .collect()
}

fn network_error(context: &str, error: reqwest::Error) -> PlatformError {
    PlatformError::Network(format!("Twitter request failed ({}): {}", context, error))
}

fn bad_response(detail: &str) -> PlatformError {
    PlatformError::Internal(format!("Unexpected Twitter response: {}", detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_encode_unreserved() {
        assert_eq!(percent_encode("abcXYZ019-._~"), "abcXYZ019-._~");
    }

    #[test]
    fn test_percent_encode_reserved() {
        assert_eq!(percent_encode("a b+c!"), "a%20b%2Bc%21");
        assert_eq!(
            percent_encode("https://api.twitter.com/"),
            "https%3A%2F%2Fapi.twitter.com%2F"
        );
    }

    /// The documented example from Twitter's "Creating a signature" guide,
    /// which is also the de-facto RFC 5849 conformance vector.
    fn example_params() -> Vec<(String, String)> {
        vec![
            (
                "oauth_consumer_key".to_string(),
                "xvz1evFS4wEEPTGEFPHBog".to_string(),
            ),
            (
                "oauth_nonce".to_string(),
                "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg".to_string(),
            ),
            (
                "oauth_signature_method".to_string(),
                "HMAC-SHA1".to_string(),
            ),
            ("oauth_timestamp".to_string(), "1318622958".to_string()),
            (
                "oauth_token".to_string(),
                "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".to_string(),
            ),
            ("oauth_version".to_string(), "1.0".to_string()),
            ("include_entities".to_string(), "true".to_string()),
            (
                "status".to_string(),
                "Hello Ladies + Gentlemen, a signed OAuth request!".to_string(),
            ),
        ]
    }

    #[test]
    fn test_signature_base_string_known_vector() {
        let base = signature_base_string(
            "post",
            "https://api.twitter.com/1.1/statuses/update.json",
            &example_params(),
        );

        assert!(base.starts_with(
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fstatuses%2Fupdate.json&"
        ));
        // Parameters must be sorted by encoded name.
        assert!(base.contains("include_entities%3Dtrue%26oauth_consumer_key"));
        // The status value is double-encoded inside the base string.
        assert!(base.ends_with(
            "status%3DHello%2520Ladies%2520%252B%2520Gentlemen%252C%2520a%2520signed%2520OAuth%2520request%2521"
        ));
    }

    #[test]
    fn test_hmac_sha1_signature_known_vector() {
        let base = signature_base_string(
            "POST",
            "https://api.twitter.com/1.1/statuses/update.json",
            &example_params(),
        );
        let signature = hmac_sha1_signature(
            &base,
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
            "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
        )
        .unwrap();

        assert_eq!(signature, "tnnArxj06cWHq44gCs1OSKk/jLY=");
    }

    #[test]
    fn test_hmac_sha1_signature_empty_token_secret() {
        // Request-token stage: no token secret yet, key ends with '&'.
        let signature = hmac_sha1_signature("POST&x&y", "consumer", "").unwrap();
        assert!(!signature.is_empty());
        assert_ne!(
            signature,
            hmac_sha1_signature("POST&x&y", "consumer", "secret").unwrap()
        );
    }

    #[test]
    fn test_parse_form_body() {
        let fields =
            parse_form_body("oauth_token=abc&oauth_token_secret=def&oauth_callback_confirmed=true");
        assert_eq!(fields.get("oauth_token").unwrap(), "abc");
        assert_eq!(fields.get("oauth_token_secret").unwrap(), "def");
        assert_eq!(fields.get("oauth_callback_confirmed").unwrap(), "true");
    }

    #[test]
    fn test_parse_form_body_decodes_values() {
        let fields = parse_form_body("screen_name=some%20user&x=a%2Bb");
        assert_eq!(fields.get("screen_name").unwrap(), "some user");
        assert_eq!(fields.get("x").unwrap(), "a+b");
    }

    #[test]
    fn test_parse_form_body_ignores_malformed_pairs() {
        let fields = parse_form_body("valid=1&garbage&also=2");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("valid").unwrap(), "1");
        assert_eq!(fields.get("also").unwrap(), "2");
    }

    #[tokio::test]
    async fn test_authorization_header_shape() {
        let db = Database::new(":memory:").await.unwrap();
        let temp = tempfile::TempDir::new().unwrap();
        let files = FileStore::new(
            &crate::config::FilesConfig {
                dir: temp.path().to_str().unwrap().to_string(),
                max_upload_bytes: 1024 * 1024,
                max_dimension: 2048,
            },
            "http://localhost:8420",
            db.clone(),
        )
        .unwrap();

        let client = TwitterClient {
            consumer_key: "ck".to_string(),
            consumer_secret: "cs".to_string(),
            callback_url: "http://localhost:8420/api/twitter/callback".to_string(),
            http: reqwest::Client::new(),
            db,
            files,
        };

        let header = client
            .authorization_header("POST", TWEETS_URL, &[], Some(("tok", "toksec")))
            .unwrap();

        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_consumer_key=\"ck\""));
        assert!(header.contains("oauth_token=\"tok\""));
        assert!(header.contains("oauth_signature_method=\"HMAC-SHA1\""));
        assert!(header.contains("oauth_signature=\""));
        assert!(header.contains("oauth_nonce=\""));
        assert!(header.contains("oauth_version=\"1.0\""));
    }

    #[tokio::test]
    async fn test_create_post_without_stored_token() {
        let db = Database::new(":memory:").await.unwrap();
        let temp = tempfile::TempDir::new().unwrap();
        let files = FileStore::new(
            &crate::config::FilesConfig {
                dir: temp.path().to_str().unwrap().to_string(),
                max_upload_bytes: 1024 * 1024,
                max_dimension: 2048,
            },
            "http://localhost:8420",
            db.clone(),
        )
        .unwrap();

        let client = TwitterClient {
            consumer_key: "ck".to_string(),
            consumer_secret: "cs".to_string(),
            callback_url: "http://localhost:8420/api/twitter/callback".to_string(),
            http: reqwest::Client::new(),
            db,
            files,
        };

        let request = PostRequest {
            content: "hello".to_string(),
            link: None,
            language: None,
            images: vec![],
        };

        let result = client.create_post(&request).await;
        match result {
            Err(crate::error::CrosscastError::Platform(PlatformError::Authentication(msg))) => {
                assert!(msg.contains("/api/twitter/login"));
            }
            other => panic!("Expected Authentication error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_authorization_unknown_request_token() {
        let db = Database::new(":memory:").await.unwrap();
        let temp = tempfile::TempDir::new().unwrap();
        let files = FileStore::new(
            &crate::config::FilesConfig {
                dir: temp.path().to_str().unwrap().to_string(),
                max_upload_bytes: 1024 * 1024,
                max_dimension: 2048,
            },
            "http://localhost:8420",
            db.clone(),
        )
        .unwrap();

        let client = TwitterClient {
            consumer_key: "ck".to_string(),
            consumer_secret: "cs".to_string(),
            callback_url: "http://localhost:8420/api/twitter/callback".to_string(),
            http: reqwest::Client::new(),
            db,
            files,
        };

        let result = client.complete_authorization("never-issued", "verifier").await;
        assert!(matches!(
            result,
            Err(crate::error::CrosscastError::Platform(
                PlatformError::Authentication(_)
            ))
        ));
    }

    #[test]
    fn test_character_limit() {
        // 280 chars is the limit the validation path enforces.
        let request = PostRequest {
            content: "a".repeat(281),
            link: None,
            language: None,
            images: vec![],
        };
        let text = compose_text(&request.content, None);
        assert_eq!(text.chars().count(), 281);
    }
}
