//! Request handlers

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use libcrosscast::types::{BroadcastRequest, PostRequest};
use libcrosscast::CrosscastError;

use crate::error::{unconfigured, ApiError};
use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /api/multiple/post` — fan one post out to every requested target.
/// The response status is the aggregate: 200 when every target succeeded,
/// otherwise the worst per-target failure.
pub async fn broadcast_post(
    State(state): State<AppState>,
    Json(mut request): Json<BroadcastRequest>,
) -> Result<Response, ApiError> {
    if request.targets.is_empty() {
        request.targets = state.default_targets.clone();
    }

    let response = state.broadcaster.broadcast(&request).await?;
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    Ok((status, Json(response)).into_response())
}

/// `POST /api/{platform}/post` — the single-target mirror of a broadcast.
pub async fn single_post(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Json(request): Json<PostRequest>,
) -> Result<Response, ApiError> {
    let broadcast = BroadcastRequest {
        content: request.content,
        link: request.link,
        language: request.language,
        images: request.images,
        targets: vec![platform],
    };

    let response = state.broadcaster.broadcast(&broadcast).await?;
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    Ok((status, Json(response)).into_response())
}

/// `POST /api/files/upload` — multipart with a `file` part and an optional
/// `alt` part. Returns the upload UUID and its public URL.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut file: Option<(Vec<u8>, Option<String>)> = None;
    let mut alt_text: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError(CrosscastError::InvalidInput(format!(
            "Malformed multipart body: {}",
            e
        )))
    })? {
        let name = field.name().map(String::from);
        match name.as_deref() {
            Some("file") => {
                let content_type = field.content_type().map(String::from);
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError(CrosscastError::InvalidInput(format!(
                        "Failed to read file part: {}",
                        e
                    )))
                })?;
                file = Some((bytes.to_vec(), content_type));
            }
            Some("alt") => {
                let text = field.text().await.map_err(|e| {
                    ApiError(CrosscastError::InvalidInput(format!(
                        "Failed to read alt part: {}",
                        e
                    )))
                })?;
                if !text.trim().is_empty() {
                    alt_text = Some(text);
                }
            }
            _ => continue,
        }
    }

    let Some((bytes, content_type)) = file else {
        return Err(ApiError(CrosscastError::InvalidInput(
            "Multipart body is missing the file part".to_string(),
        )));
    };

    let upload = state
        .files
        .save(bytes, content_type.as_deref(), alt_text)
        .await?;

    info!("Stored upload {}", upload.id);

    Ok(Json(serde_json::json!({
        "uuid": upload.id,
        "url": state.files.public_url(&upload.id),
    }))
    .into_response())
}

/// `GET /api/files/{upload_id}` — the stored bytes with their content type.
pub async fn get_file(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<Response, ApiError> {
    let (upload, bytes) = match state.files.load(&upload_id).await {
        Ok(loaded) => loaded,
        Err(CrosscastError::InvalidInput(_)) => {
            return Ok((
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "Unknown upload", "status": 404 })),
            )
                .into_response())
        }
        Err(e) => return Err(e.into()),
    };

    Ok((
        [(header::CONTENT_TYPE, upload.mime_type.as_str())],
        bytes,
    )
        .into_response())
}

/// `GET /api/rss/feed` — the rendered feed.
pub async fn rss_feed(State(state): State<AppState>) -> Result<Response, ApiError> {
    let rss = state.rss.as_ref().ok_or_else(|| unconfigured("rss"))?;
    let xml = rss.build_feed().await?;

    Ok((
        [(header::CONTENT_TYPE, "application/rss+xml; charset=utf-8")],
        xml,
    )
        .into_response())
}

// ============================================================================
// OAuth flows
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TwitterCallbackParams {
    pub oauth_token: String,
    pub oauth_verifier: String,
}

/// `GET /api/twitter/login` — start the three-legged flow.
pub async fn twitter_login(State(state): State<AppState>) -> Result<Redirect, ApiError> {
    let twitter = state.twitter.as_ref().ok_or_else(|| unconfigured("twitter"))?;
    let authorize_url = twitter.begin_authorization().await?;
    Ok(Redirect::temporary(&authorize_url))
}

/// `GET /api/twitter/callback` — finish it and persist the token.
pub async fn twitter_callback(
    State(state): State<AppState>,
    Query(params): Query<TwitterCallbackParams>,
) -> Result<Response, ApiError> {
    let twitter = state.twitter.as_ref().ok_or_else(|| unconfigured("twitter"))?;
    let token = twitter
        .complete_authorization(&params.oauth_token, &params.oauth_verifier)
        .await?;

    info!("Twitter account connected");

    Ok(Json(serde_json::json!({
        "connected": true,
        "platform": "twitter",
        "screen_name": token.screen_name,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct LinkedinCallbackParams {
    pub code: String,
    pub state: String,
}

/// `GET /api/linkedin/login` — start the authorization-code flow.
pub async fn linkedin_login(State(state): State<AppState>) -> Result<Redirect, ApiError> {
    let linkedin = state
        .linkedin
        .as_ref()
        .ok_or_else(|| unconfigured("linkedin"))?;
    let authorization_url = linkedin.begin_authorization().await?;
    Ok(Redirect::temporary(&authorization_url))
}

/// `GET /api/linkedin/callback` — verify the state nonce, exchange the
/// code, persist the token.
pub async fn linkedin_callback(
    State(state): State<AppState>,
    Query(params): Query<LinkedinCallbackParams>,
) -> Result<Response, ApiError> {
    let linkedin = state
        .linkedin
        .as_ref()
        .ok_or_else(|| unconfigured("linkedin"))?;
    let token = linkedin
        .complete_authorization(&params.code, &params.state)
        .await?;

    info!("LinkedIn account connected as {}", token.person_urn);

    Ok(Json(serde_json::json!({
        "connected": true,
        "platform": "linkedin",
        "person_urn": token.person_urn,
    }))
    .into_response())
}
