//! Mapping from service errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use dork_core::error::Error;

pub struct ApiError(pub Error);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

fn status_of(error: &Error) -> StatusCode {
    match error.code() {
        code if code.starts_with("auth_") => StatusCode::UNAUTHORIZED,
        "match_not_found" => StatusCode::NOT_FOUND,
        "match_emergency_mode" => StatusCode::SERVICE_UNAVAILABLE,
        "internal" => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(&self.0);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Internal error on request: {}", self.0);
        }
        let body = Json(json!({
            "error": self.0.code(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_of(&Error::AuthInvalidSignature), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(&Error::MatchNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_of(&Error::EmergencyMode), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(&Error::InvalidAction), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(&Error::InternalError("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
