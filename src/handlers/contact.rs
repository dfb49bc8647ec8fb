use axum::{extract::State, Json};
use serde::Deserialize;

use crate::{error::AppError, response::ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub message: String,
}

/// Relays a storefront contact-form message to the shop inbox. Unlike the
/// checkout notifications this send is the whole operation, so a provider
/// failure surfaces to the caller.
pub async fn contact(
    State(state): State<AppState>,
    Json(req): Json<ContactRequest>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    if req.name.trim().is_empty() || req.message.trim().is_empty() {
        return Err(AppError::Validation("name and message are required".to_string()));
    }
    if !req.email.contains('@') {
        return Err(AppError::Validation("a valid email is required".to_string()));
    }

    state
        .mailer
        .send_contact_message(req.name.trim(), req.email.trim(), req.message.trim())
        .await?;

    Ok(ApiResponse::ok("Message sent", serde_json::json!(null)))
}
