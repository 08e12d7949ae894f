//! HTTP error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use libcrosscast::CrosscastError;

/// Wraps library errors so handlers can use `?` and still produce JSON
/// error bodies with the right status.
pub struct ApiError(pub CrosscastError);

impl From<CrosscastError> for ApiError {
    fn from(error: CrosscastError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}

/// 503 for endpoints whose platform section is absent or disabled.
pub fn unconfigured(platform: &str) -> ApiError {
    ApiError(
        libcrosscast::error::PlatformError::Unconfigured(format!(
            "Platform {} is not configured",
            platform
        ))
        .into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let response =
            ApiError(CrosscastError::InvalidInput("nope".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = unconfigured("twitter").into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
