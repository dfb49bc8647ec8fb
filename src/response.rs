use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::query::PaginationMeta;

/// Standard response envelope. Every successful handler returns one of
/// these so clients always see `{statusCode, success, message, data}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PaginationMeta>,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: &str, data: T) -> Self {
        Self {
            status_code: StatusCode::OK.as_u16(),
            success: true,
            message: message.to_string(),
            meta: None,
            data,
        }
    }

    pub fn created(message: &str, data: T) -> Self {
        Self {
            status_code: StatusCode::CREATED.as_u16(),
            success: true,
            message: message.to_string(),
            meta: None,
            data,
        }
    }

    pub fn list(message: &str, data: T, meta: PaginationMeta) -> Self {
        Self {
            status_code: StatusCode::OK.as_u16(),
            success: true,
            message: message.to_string(),
            meta: Some(meta),
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_with_camel_case_keys() {
        let body = serde_json::to_value(ApiResponse::ok("done", 7)).unwrap();
        assert_eq!(body["statusCode"], 200);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "done");
        assert_eq!(body["data"], 7);
        assert!(body.get("meta").is_none());
    }

    #[test]
    fn created_uses_201() {
        let body = serde_json::to_value(ApiResponse::created("made", "x")).unwrap();
        assert_eq!(body["statusCode"], 201);
    }
}
