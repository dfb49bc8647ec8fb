use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::json;
use tower_cookies::Cookies;

use crate::{
    error::AppError,
    middleware::maybe_current_user,
    payments::{WebhookEvent, EVENT_CHECKOUT_COMPLETED, SIGNATURE_HEADER},
    response::ApiResponse,
    services::checkout::{self, CheckoutRequest, PgCheckoutStore},
    AppState,
};

pub async fn create_session(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    let user_id = maybe_current_user(&headers, &cookies, &state.db).await.map(|u| u.id);

    let store = PgCheckoutStore::new(state.db.clone());
    let session = checkout::initiate(&store, &state.payments, req, user_id).await?;

    Ok(ApiResponse::ok(
        "Checkout session created",
        json!({ "sessionId": session.session_id, "url": session.url }),
    ))
}

/// Provider callback. The signature covers the raw body, so the body is
/// taken as bytes and parsed only after verification.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing webhook signature".to_string()))?;
    if !state.payments.verify_webhook_signature(&body, signature) {
        return Err(AppError::Unauthorized("invalid webhook signature".to_string()));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("malformed webhook payload: {e}")))?;

    if event.event != EVENT_CHECKOUT_COMPLETED {
        return Ok(ApiResponse::ok("Event ignored", json!({ "received": true })));
    }

    let store = PgCheckoutStore::new(state.db.clone());
    let (order, items) = checkout::complete(&store, &event.data).await?;

    // Notifications are best-effort and run after the transaction has
    // committed; a failed send never unwinds the order.
    let mailer = state.mailer.clone();
    let order_for_mail = order.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer.send_order_confirmation(&order_for_mail, &items).await {
            log::error!("order confirmation email failed for {}: {e}", order_for_mail.order_number);
        }
        if let Err(e) = mailer.send_admin_order_alert(&order_for_mail, &items).await {
            log::error!("admin order alert failed for {}: {e}", order_for_mail.order_number);
        }
    });

    Ok(ApiResponse::created("Order recorded", json!({ "orderId": order.id })))
}
