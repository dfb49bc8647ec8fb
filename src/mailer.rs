use reqwest::Client;
use serde::Serialize;
use std::env;

use crate::{
    error::AppError,
    models::{Order, OrderItem},
};

/// Client for the transactional email API. Sends are best-effort: callers
/// on the checkout path spawn them after commit and only log failures.
#[derive(Clone)]
pub struct Mailer {
    http: Client,
    api_url: String,
    api_key: String,
    from: String,
    admin_email: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

impl Mailer {
    pub fn from_env() -> Self {
        Self {
            http: Client::new(),
            api_url: env::var("EMAIL_API_URL").expect("EMAIL_API_URL must be set"),
            api_key: env::var("EMAIL_API_KEY").expect("EMAIL_API_KEY must be set"),
            from: env::var("EMAIL_FROM").expect("EMAIL_FROM must be set"),
            admin_email: env::var("ADMIN_EMAIL").expect("ADMIN_EMAIL must be set"),
        }
    }

    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<(), AppError> {
        let request = SendRequest { from: &self.from, to, subject, text, reply_to };
        let response = self
            .http
            .post(format!("{}/v1/send", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("email provider unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalService(format!(
                "email provider rejected message ({status})"
            )));
        }
        Ok(())
    }

    pub async fn send_order_confirmation(
        &self,
        order: &Order,
        items: &[OrderItem],
    ) -> Result<(), AppError> {
        let lines: Vec<String> = items
            .iter()
            .map(|i| format!("  {} x{} ({}) - {}", i.product_name, i.quantity, i.size, i.unit_price))
            .collect();
        let text = format!(
            "Hi {},\n\nThanks for your order {}. We are getting it ready.\n\n{}\n\nTotal paid: {} {}\nShipping to: {}\n",
            order.customer_name,
            order.order_number,
            lines.join("\n"),
            order.amount_paid,
            order.currency,
            order.shipping_address,
        );
        self.send(
            &order.email,
            &format!("Order confirmation {}", order.order_number),
            &text,
            None,
        )
        .await
    }

    pub async fn send_admin_order_alert(
        &self,
        order: &Order,
        items: &[OrderItem],
    ) -> Result<(), AppError> {
        let text = format!(
            "New order {} from {} <{}>: {} line(s), {} {} paid.",
            order.order_number,
            order.customer_name,
            order.email,
            items.len(),
            order.amount_paid,
            order.currency,
        );
        self.send(
            &self.admin_email,
            &format!("New order {}", order.order_number),
            &text,
            None,
        )
        .await
    }

    pub async fn send_contact_message(
        &self,
        name: &str,
        reply_to: &str,
        message: &str,
    ) -> Result<(), AppError> {
        let text = format!("Message from {name} <{reply_to}>:\n\n{message}");
        self.send(&self.admin_email, "New contact form message", &text, Some(reply_to))
            .await
    }
}
