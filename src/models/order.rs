use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const ORDER_STATUSES: [&str; 4] = ["PROCESSING", "SHIPPED", "DELIVERED", "CANCELLED"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Option<Uuid>,
    pub customer_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub shipping_address: String,
    pub amount_paid: Decimal,
    pub currency: String,
    pub provider_session_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub product_name: String,
    pub image_url: Option<String>,
    pub size: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

/// Denormalized copy of a purchased line, taken at payment time. Orders
/// keep these values instead of live product references so later catalog
/// edits cannot change what a historical order says was bought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemSnapshot {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub product_name: String,
    pub image_url: Option<String>,
    pub size: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub user_id: Option<Uuid>,
    pub customer_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub shipping_address: String,
    pub amount_paid: Decimal,
    pub currency: String,
    pub provider_session_id: String,
    pub items: Vec<OrderItemSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}
