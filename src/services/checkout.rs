use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    database::Database,
    error::AppError,
    models::{NewOrder, Order, OrderItem, OrderItemSnapshot, VariantWithProduct},
    payments::{CheckoutSession, MetadataLine, PaymentClient, SessionMetadata, WebhookData},
};

pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub customer_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub shipping_address: String,
    pub lines: Vec<CheckoutLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLine {
    pub variant_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug)]
pub struct PricedCheckout {
    pub total: Decimal,
    pub metadata: SessionMetadata,
}

/// Storage seam for the checkout workflow. `fulfill_order` must persist
/// the order and its snapshot lines, decrement each variant's quantity and
/// increment each product's sales counter as one atomic unit.
#[async_trait]
pub trait CheckoutStore {
    async fn variant_with_product(
        &self,
        variant_id: Uuid,
    ) -> Result<Option<VariantWithProduct>, AppError>;

    async fn fulfill_order(&self, order: NewOrder) -> Result<(Order, Vec<OrderItem>), AppError>;
}

/// Re-prices the submitted cart from authoritative variant rows. Client
/// prices never enter the calculation; only ids and quantities are taken
/// from the request. Stock sufficiency is checked here, at initiation,
/// and nowhere later.
pub async fn price_checkout<S: CheckoutStore>(
    store: &S,
    request: CheckoutRequest,
    user_id: Option<Uuid>,
) -> Result<PricedCheckout, AppError> {
    if request.lines.is_empty() {
        return Err(AppError::Validation("cart is empty".to_string()));
    }
    if request.customer_name.trim().is_empty() || request.email.trim().is_empty() {
        return Err(AppError::Validation("customer name and email are required".to_string()));
    }
    if request.shipping_address.trim().is_empty() {
        return Err(AppError::Validation("shipping address is required".to_string()));
    }

    let mut total = Decimal::ZERO;
    let mut lines = Vec::with_capacity(request.lines.len());
    for line in &request.lines {
        if line.quantity < 1 {
            return Err(AppError::Validation("quantity must be at least 1".to_string()));
        }
        let variant = store
            .variant_with_product(line.variant_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("variant {} does not exist", line.variant_id))
            })?;
        if !variant.published {
            return Err(AppError::Validation(format!(
                "'{}' is not available for purchase",
                variant.product_name
            )));
        }
        if variant.quantity < line.quantity {
            return Err(AppError::Validation(format!(
                "only {} of '{}' ({}) left in stock",
                variant.quantity, variant.product_name, variant.size
            )));
        }
        total += variant.price * Decimal::from(line.quantity);
        lines.push(MetadataLine { variant_id: line.variant_id, quantity: line.quantity });
    }

    Ok(PricedCheckout {
        total,
        metadata: SessionMetadata {
            user_id,
            customer_name: request.customer_name,
            email: request.email,
            phone: request.phone,
            shipping_address: request.shipping_address,
            lines,
        },
    })
}

/// Creates the provider checkout session. No order row exists until the
/// completion webhook arrives; the session metadata is the only handle.
pub async fn initiate<S: CheckoutStore>(
    store: &S,
    payments: &PaymentClient,
    request: CheckoutRequest,
    user_id: Option<Uuid>,
) -> Result<CheckoutSession, AppError> {
    let priced = price_checkout(store, request, user_id).await?;
    payments
        .create_checkout_session(
            priced.total,
            DEFAULT_CURRENCY,
            &priced.metadata.email,
            &priced.metadata,
        )
        .await
}

/// Handles a verified `checkout.completed` event. Variant and product data
/// are re-resolved by id; metadata is only trusted for ids, quantities and
/// the contact details the customer entered. A variant that has vanished
/// since payment is a data-integrity fault and fails the whole event:
/// silently dropping it would under-deliver a paid order.
pub async fn complete<S: CheckoutStore>(
    store: &S,
    data: &WebhookData,
) -> Result<(Order, Vec<OrderItem>), AppError> {
    let mut items = Vec::with_capacity(data.metadata.lines.len());
    for line in &data.metadata.lines {
        let variant = store
            .variant_with_product(line.variant_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "paid session {} references missing variant {}",
                    data.session_id, line.variant_id
                ))
            })?;
        items.push(OrderItemSnapshot {
            product_id: variant.product_id,
            variant_id: variant.variant_id,
            product_name: variant.product_name,
            image_url: variant.image_url,
            size: variant.size,
            unit_price: variant.price,
            quantity: line.quantity,
        });
    }

    let order = NewOrder {
        order_number: generate_order_number(),
        user_id: data.metadata.user_id,
        customer_name: data.metadata.customer_name.clone(),
        email: data.metadata.email.clone(),
        phone: data.metadata.phone.clone(),
        shipping_address: data.metadata.shipping_address.clone(),
        amount_paid: data.amount,
        currency: data.currency.clone(),
        provider_session_id: data.session_id.clone(),
        items,
    };

    store.fulfill_order(order).await
}

fn generate_order_number() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("ORD-{}", id[..10].to_uppercase())
}

pub struct PgCheckoutStore {
    db: Database,
}

impl PgCheckoutStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CheckoutStore for PgCheckoutStore {
    async fn variant_with_product(
        &self,
        variant_id: Uuid,
    ) -> Result<Option<VariantWithProduct>, AppError> {
        let row = sqlx::query_as::<_, VariantWithProduct>(
            r#"
            SELECT v.id AS variant_id, v.product_id, v.sku, v.size, v.price, v.quantity,
                   p.name AS product_name, p.image_url, p.published
            FROM product_variants v
            JOIN products p ON p.id = v.product_id
            WHERE v.id = $1
            "#,
        )
        .bind(variant_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn fulfill_order(&self, order: NewOrder) -> Result<(Order, Vec<OrderItem>), AppError> {
        let mut tx = self.db.begin().await?;

        let created = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (id, order_number, user_id, customer_name, email, phone,
                                shipping_address, amount_paid, currency, provider_session_id,
                                status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'PROCESSING', NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&order.order_number)
        .bind(order.user_id)
        .bind(&order.customer_name)
        .bind(&order.email)
        .bind(&order.phone)
        .bind(&order.shipping_address)
        .bind(order.amount_paid)
        .bind(&order.currency)
        .bind(&order.provider_session_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let row = sqlx::query_as::<_, OrderItem>(
                r#"
                INSERT INTO order_items (id, order_id, product_id, variant_id, product_name,
                                         image_url, size, unit_price, quantity)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(created.id)
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(&item.product_name)
            .bind(&item.image_url)
            .bind(&item.size)
            .bind(item.unit_price)
            .bind(item.quantity)
            .fetch_one(&mut *tx)
            .await?;

            let remaining: i32 = sqlx::query_scalar(
                "UPDATE product_variants SET quantity = quantity - $1 WHERE id = $2 RETURNING quantity",
            )
            .bind(item.quantity)
            .bind(item.variant_id)
            .fetch_one(&mut *tx)
            .await?;
            if remaining < 0 {
                // Sufficiency is only checked at initiation; an oversell
                // here needs operator follow-up.
                log::warn!(
                    "variant {} oversold by {} on order {}",
                    item.variant_id,
                    -remaining,
                    order.order_number
                );
            }

            sqlx::query("UPDATE products SET sales = sales + $1, updated_at = NOW() WHERE id = $2")
                .bind(item.quantity)
                .bind(item.product_id)
                .execute(&mut *tx)
                .await?;

            items.push(row);
        }

        tx.commit().await?;
        Ok((created, items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemoryStore {
        variants: Mutex<HashMap<Uuid, VariantWithProduct>>,
        sales: Mutex<HashMap<Uuid, i32>>,
        orders: Mutex<Vec<(Order, Vec<OrderItem>)>>,
    }

    impl MemoryStore {
        fn new(variants: Vec<VariantWithProduct>) -> Self {
            Self {
                variants: Mutex::new(
                    variants.into_iter().map(|v| (v.variant_id, v)).collect(),
                ),
                sales: Mutex::new(HashMap::new()),
                orders: Mutex::new(Vec::new()),
            }
        }

        fn quantity_of(&self, variant_id: Uuid) -> i32 {
            self.variants.lock().unwrap()[&variant_id].quantity
        }

        fn sales_of(&self, product_id: Uuid) -> i32 {
            *self.sales.lock().unwrap().get(&product_id).unwrap_or(&0)
        }
    }

    #[async_trait]
    impl CheckoutStore for MemoryStore {
        async fn variant_with_product(
            &self,
            variant_id: Uuid,
        ) -> Result<Option<VariantWithProduct>, AppError> {
            Ok(self.variants.lock().unwrap().get(&variant_id).cloned())
        }

        async fn fulfill_order(
            &self,
            order: NewOrder,
        ) -> Result<(Order, Vec<OrderItem>), AppError> {
            let created = Order {
                id: Uuid::new_v4(),
                order_number: order.order_number.clone(),
                user_id: order.user_id,
                customer_name: order.customer_name.clone(),
                email: order.email.clone(),
                phone: order.phone.clone(),
                shipping_address: order.shipping_address.clone(),
                amount_paid: order.amount_paid,
                currency: order.currency.clone(),
                provider_session_id: order.provider_session_id.clone(),
                status: "PROCESSING".to_string(),
                created_at: Utc::now(),
            };
            let mut rows = Vec::new();
            {
                let mut variants = self.variants.lock().unwrap();
                let mut sales = self.sales.lock().unwrap();
                for item in &order.items {
                    let variant = variants
                        .get_mut(&item.variant_id)
                        .ok_or_else(|| AppError::Internal("variant vanished".to_string()))?;
                    variant.quantity -= item.quantity;
                    *sales.entry(item.product_id).or_insert(0) += item.quantity;
                    rows.push(OrderItem {
                        id: Uuid::new_v4(),
                        order_id: created.id,
                        product_id: item.product_id,
                        variant_id: item.variant_id,
                        product_name: item.product_name.clone(),
                        image_url: item.image_url.clone(),
                        size: item.size.clone(),
                        unit_price: item.unit_price,
                        quantity: item.quantity,
                    });
                }
            }
            self.orders
                .lock()
                .unwrap()
                .push((created.clone(), rows.clone()));
            Ok((created, rows))
        }
    }

    fn variant(price: i64, quantity: i32) -> VariantWithProduct {
        VariantWithProduct {
            variant_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            sku: "SKU-1".to_string(),
            size: "200g".to_string(),
            price: Decimal::from(price),
            quantity,
            product_name: "Amber Candle".to_string(),
            image_url: None,
            published: true,
        }
    }

    fn request(lines: Vec<CheckoutLine>) -> CheckoutRequest {
        CheckoutRequest {
            customer_name: "Ada".to_string(),
            email: "ada@example.test".to_string(),
            phone: None,
            shipping_address: "1 Engine Way".to_string(),
            lines,
        }
    }

    fn webhook_data(lines: Vec<MetadataLine>, amount: i64) -> WebhookData {
        WebhookData {
            session_id: "cs_123".to_string(),
            amount: Decimal::from(amount),
            currency: DEFAULT_CURRENCY.to_string(),
            metadata: SessionMetadata {
                user_id: None,
                customer_name: "Ada".to_string(),
                email: "ada@example.test".to_string(),
                phone: None,
                shipping_address: "1 Engine Way".to_string(),
                lines,
            },
        }
    }

    #[tokio::test]
    async fn pricing_uses_authoritative_prices_and_quantities() {
        let v1 = variant(20, 10);
        let v2 = variant(35, 4);
        let store = MemoryStore::new(vec![v1.clone(), v2.clone()]);

        let priced = price_checkout(
            &store,
            request(vec![
                CheckoutLine { variant_id: v1.variant_id, quantity: 2 },
                CheckoutLine { variant_id: v2.variant_id, quantity: 1 },
            ]),
            None,
        )
        .await
        .unwrap();

        assert_eq!(priced.total, Decimal::from(75));
        assert_eq!(priced.metadata.lines.len(), 2);
    }

    #[tokio::test]
    async fn pricing_rejects_insufficient_stock() {
        let v = variant(20, 3);
        let store = MemoryStore::new(vec![v.clone()]);
        let err = price_checkout(
            &store,
            request(vec![CheckoutLine { variant_id: v.variant_id, quantity: 5 }]),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn pricing_rejects_unknown_variant_and_empty_cart() {
        let store = MemoryStore::new(vec![]);
        let err = price_checkout(
            &store,
            request(vec![CheckoutLine { variant_id: Uuid::new_v4(), quantity: 1 }]),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = price_checkout(&store, request(vec![]), None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn completion_records_one_order_and_adjusts_counters() {
        let v1 = variant(20, 10);
        let v2 = variant(35, 4);
        let store = MemoryStore::new(vec![v1.clone(), v2.clone()]);

        let (order, items) = complete(
            &store,
            &webhook_data(
                vec![
                    MetadataLine { variant_id: v1.variant_id, quantity: 3 },
                    MetadataLine { variant_id: v2.variant_id, quantity: 1 },
                ],
                95,
            ),
        )
        .await
        .unwrap();

        assert_eq!(store.orders.lock().unwrap().len(), 1);
        assert_eq!(items.len(), 2);
        assert_eq!(order.amount_paid, Decimal::from(95));
        assert_eq!(order.provider_session_id, "cs_123");
        assert_eq!(store.quantity_of(v1.variant_id), 7);
        assert_eq!(store.quantity_of(v2.variant_id), 3);
        assert_eq!(store.sales_of(v1.product_id), 3);
        assert_eq!(store.sales_of(v2.product_id), 1);

        // Snapshot values come from the store, not the metadata.
        let snap = items.iter().find(|i| i.variant_id == v1.variant_id).unwrap();
        assert_eq!(snap.product_name, "Amber Candle");
        assert_eq!(snap.unit_price, Decimal::from(20));
    }

    #[tokio::test]
    async fn completion_fails_loudly_when_a_paid_variant_is_missing() {
        let v = variant(20, 10);
        let store = MemoryStore::new(vec![v.clone()]);

        let err = complete(
            &store,
            &webhook_data(
                vec![
                    MetadataLine { variant_id: v.variant_id, quantity: 1 },
                    MetadataLine { variant_id: Uuid::new_v4(), quantity: 2 },
                ],
                55,
            ),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Internal(_)));
        assert!(store.orders.lock().unwrap().is_empty());
        assert_eq!(store.quantity_of(v.variant_id), 10);
    }

    #[tokio::test]
    async fn completion_does_not_recheck_stock_sufficiency() {
        // Two checkouts raced for the last unit; the second paid session
        // still fulfills and the variant goes negative.
        let v = variant(20, 1);
        let store = MemoryStore::new(vec![v.clone()]);

        let result = complete(
            &store,
            &webhook_data(vec![MetadataLine { variant_id: v.variant_id, quantity: 3 }], 60),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(store.quantity_of(v.variant_id), -2);
    }

    #[test]
    fn order_numbers_are_prefixed_and_distinct() {
        let a = generate_order_number();
        let b = generate_order_number();
        assert!(a.starts_with("ORD-"));
        assert_eq!(a.len(), 14);
        assert_ne!(a, b);
    }
}
