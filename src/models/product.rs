use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category_id: Uuid,
    pub material_id: Option<Uuid>,
    pub fragrance_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub stock: i32,
    pub sales: i32,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub size: String,
    pub price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub variants: Vec<ProductVariant>,
}

// Variant joined with the columns of its product that checkout needs.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VariantWithProduct {
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub size: String,
    pub price: Decimal,
    pub quantity: i32,
    pub product_name: String,
    pub image_url: Option<String>,
    pub published: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub description: String,
    pub category_id: Uuid,
    pub material_id: Option<Uuid>,
    pub fragrance_id: Option<Uuid>,
    pub variants: Vec<CreateVariantRequest>,
}

#[derive(Debug, Deserialize)]
pub struct CreateVariantRequest {
    pub sku: String,
    pub size: String,
    pub price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub material_id: Option<Uuid>,
    pub fragrance_id: Option<Uuid>,
    pub published: Option<bool>,
}
