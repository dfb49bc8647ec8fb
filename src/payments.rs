use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::env;
use uuid::Uuid;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const EVENT_CHECKOUT_COMPLETED: &str = "checkout.completed";

/// Client for the hosted-checkout payment provider. The session the
/// provider holds is the only durable handle between initiation and the
/// completion webhook, so the cart snapshot rides along as metadata.
#[derive(Clone)]
pub struct PaymentClient {
    http: Client,
    base_url: String,
    secret_key: String,
    webhook_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataLine {
    pub variant_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub user_id: Option<Uuid>,
    pub customer_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub shipping_address: String,
    pub lines: Vec<MetadataLine>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest<'a> {
    amount: Decimal,
    currency: &'a str,
    customer_email: &'a str,
    success_url: String,
    cancel_url: String,
    metadata: &'a SessionMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookData {
    pub session_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub metadata: SessionMetadata,
}

impl PaymentClient {
    pub fn from_env() -> Self {
        Self {
            http: Client::new(),
            base_url: env::var("PAYMENT_API_URL").expect("PAYMENT_API_URL must be set"),
            secret_key: env::var("PAYMENT_SECRET_KEY").expect("PAYMENT_SECRET_KEY must be set"),
            webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET")
                .expect("PAYMENT_WEBHOOK_SECRET must be set"),
        }
    }

    pub async fn create_checkout_session(
        &self,
        amount: Decimal,
        currency: &str,
        customer_email: &str,
        metadata: &SessionMetadata,
    ) -> Result<CheckoutSession, AppError> {
        let client_url =
            env::var("CLIENT_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let request = CreateSessionRequest {
            amount,
            currency,
            customer_email,
            success_url: format!("{client_url}/checkout/success"),
            cancel_url: format!("{client_url}/checkout/cancelled"),
            metadata,
        };

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("payment provider unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "payment provider rejected session ({status}): {body}"
            )));
        }

        response
            .json::<CheckoutSession>()
            .await
            .map_err(|e| AppError::ExternalService(format!("malformed provider response: {e}")))
    }

    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        verify_signature(&self.webhook_secret, payload, signature)
    }
}

/// Checks the provider's hex-encoded HMAC-SHA256 of the raw request body.
/// Comparison is constant-time via the mac's own verify.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_verifies_own_signing() {
        let payload = br#"{"event":"checkout.completed"}"#;
        let sig = sign_payload("whsec_test", payload);
        assert!(verify_signature("whsec_test", payload, &sig));
    }

    #[test]
    fn tampered_payload_or_wrong_secret_fails() {
        let payload = br#"{"event":"checkout.completed"}"#;
        let sig = sign_payload("whsec_test", payload);
        assert!(!verify_signature("whsec_test", b"{}", &sig));
        assert!(!verify_signature("other_secret", payload, &sig));
    }

    #[test]
    fn malformed_signature_header_fails_closed() {
        assert!(!verify_signature("whsec_test", b"{}", "not-hex!"));
        assert!(!verify_signature("whsec_test", b"{}", ""));
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let metadata = SessionMetadata {
            user_id: None,
            customer_name: "Ada".to_string(),
            email: "ada@example.test".to_string(),
            phone: None,
            shipping_address: "1 Engine Way".to_string(),
            lines: vec![MetadataLine { variant_id: Uuid::new_v4(), quantity: 2 }],
        };
        let json = serde_json::to_string(&metadata).unwrap();
        let back: SessionMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
    }
}
