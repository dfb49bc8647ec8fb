use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    database::Database,
    error::AppError,
    models::{CartItem, STATUS_IN_CART},
};

/// Storage seam for the cart. A (user, product, variant) tuple owns at most
/// one active row; guests carry a null user id and null compares equal to
/// null for dedup purposes.
#[async_trait]
pub trait CartStore {
    async fn product_published(&self, product_id: Uuid) -> Result<Option<bool>, AppError>;
    async fn variant_belongs_to(
        &self,
        variant_id: Uuid,
        product_id: Uuid,
    ) -> Result<bool, AppError>;
    async fn find_active_item(
        &self,
        user_id: Option<Uuid>,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<Option<CartItem>, AppError>;
    async fn increment_quantity(&self, item_id: Uuid, by: i32) -> Result<CartItem, AppError>;
    async fn insert_item(
        &self,
        user_id: Option<Uuid>,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<CartItem, AppError>;
}

/// Adds a line to the cart. A repeat add of the same (user, product,
/// variant) bumps the existing row's quantity instead of inserting a
/// duplicate.
pub async fn add_item<S: CartStore>(
    store: &S,
    user_id: Option<Uuid>,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
) -> Result<CartItem, AppError> {
    if quantity < 1 {
        return Err(AppError::Validation("quantity must be at least 1".to_string()));
    }

    match store.product_published(product_id).await? {
        None => {
            return Err(AppError::NotFound(format!("product {product_id} does not exist")))
        }
        Some(false) => {
            return Err(AppError::Validation("product is not available".to_string()))
        }
        Some(true) => {}
    }

    if let Some(variant_id) = variant_id {
        if !store.variant_belongs_to(variant_id, product_id).await? {
            return Err(AppError::NotFound(format!(
                "variant {variant_id} does not belong to product {product_id}"
            )));
        }
    }

    match store.find_active_item(user_id, product_id, variant_id).await? {
        Some(existing) => store.increment_quantity(existing.id, quantity).await,
        None => store.insert_item(user_id, product_id, variant_id, quantity).await,
    }
}

pub struct PgCartStore {
    db: Database,
}

impl PgCartStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CartStore for PgCartStore {
    async fn product_published(&self, product_id: Uuid) -> Result<Option<bool>, AppError> {
        let published: Option<bool> =
            sqlx::query_scalar("SELECT published FROM products WHERE id = $1")
                .bind(product_id)
                .fetch_optional(&self.db)
                .await?;
        Ok(published)
    }

    async fn variant_belongs_to(
        &self,
        variant_id: Uuid,
        product_id: Uuid,
    ) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM product_variants WHERE id = $1 AND product_id = $2)",
        )
        .bind(variant_id)
        .bind(product_id)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    async fn find_active_item(
        &self,
        user_id: Option<Uuid>,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<Option<CartItem>, AppError> {
        let item = sqlx::query_as::<_, CartItem>(
            r#"
            SELECT * FROM cart_items
            WHERE user_id IS NOT DISTINCT FROM $1
              AND product_id = $2
              AND variant_id IS NOT DISTINCT FROM $3
              AND status = $4
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(variant_id)
        .bind(STATUS_IN_CART)
        .fetch_optional(&self.db)
        .await?;
        Ok(item)
    }

    async fn increment_quantity(&self, item_id: Uuid, by: i32) -> Result<CartItem, AppError> {
        let item = sqlx::query_as::<_, CartItem>(
            "UPDATE cart_items SET quantity = quantity + $2 WHERE id = $1 RETURNING *",
        )
        .bind(item_id)
        .bind(by)
        .fetch_one(&self.db)
        .await?;
        Ok(item)
    }

    async fn insert_item(
        &self,
        user_id: Option<Uuid>,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<CartItem, AppError> {
        let item = sqlx::query_as::<_, CartItem>(
            r#"
            INSERT INTO cart_items (id, user_id, product_id, variant_id, quantity, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(product_id)
        .bind(variant_id)
        .bind(quantity)
        .bind(STATUS_IN_CART)
        .fetch_one(&self.db)
        .await?;
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemoryCartStore {
        products: HashMap<Uuid, bool>, // product -> published
        variants: HashMap<Uuid, Uuid>, // variant -> product
        items: Mutex<Vec<CartItem>>,
    }

    impl MemoryCartStore {
        fn new(products: &[(Uuid, bool)], variants: &[(Uuid, Uuid)]) -> Self {
            Self {
                products: products.iter().copied().collect(),
                variants: variants.iter().copied().collect(),
                items: Mutex::new(Vec::new()),
            }
        }

        fn rows(&self) -> Vec<CartItem> {
            self.items.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CartStore for MemoryCartStore {
        async fn product_published(&self, product_id: Uuid) -> Result<Option<bool>, AppError> {
            Ok(self.products.get(&product_id).copied())
        }

        async fn variant_belongs_to(
            &self,
            variant_id: Uuid,
            product_id: Uuid,
        ) -> Result<bool, AppError> {
            Ok(self.variants.get(&variant_id) == Some(&product_id))
        }

        async fn find_active_item(
            &self,
            user_id: Option<Uuid>,
            product_id: Uuid,
            variant_id: Option<Uuid>,
        ) -> Result<Option<CartItem>, AppError> {
            Ok(self.rows().into_iter().find(|i| {
                i.user_id == user_id
                    && i.product_id == product_id
                    && i.variant_id == variant_id
                    && i.status == STATUS_IN_CART
            }))
        }

        async fn increment_quantity(&self, item_id: Uuid, by: i32) -> Result<CartItem, AppError> {
            let mut items = self.items.lock().unwrap();
            let item = items
                .iter_mut()
                .find(|i| i.id == item_id)
                .ok_or_else(|| AppError::NotFound("cart item vanished".to_string()))?;
            item.quantity += by;
            Ok(item.clone())
        }

        async fn insert_item(
            &self,
            user_id: Option<Uuid>,
            product_id: Uuid,
            variant_id: Option<Uuid>,
            quantity: i32,
        ) -> Result<CartItem, AppError> {
            let item = CartItem {
                id: Uuid::new_v4(),
                user_id,
                product_id,
                variant_id,
                quantity,
                status: STATUS_IN_CART.to_string(),
                created_at: Utc::now(),
            };
            self.items.lock().unwrap().push(item.clone());
            Ok(item)
        }
    }

    #[tokio::test]
    async fn repeat_guest_add_bumps_the_single_row() {
        let product_id = Uuid::new_v4();
        let variant_id = Uuid::new_v4();
        let store =
            MemoryCartStore::new(&[(product_id, true)], &[(variant_id, product_id)]);

        add_item(&store, None, product_id, Some(variant_id), 1).await.unwrap();
        let item = add_item(&store, None, product_id, Some(variant_id), 2).await.unwrap();

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(item.quantity, 3);
        assert_eq!(rows[0].user_id, None);
    }

    #[tokio::test]
    async fn different_variant_gets_its_own_row() {
        let product_id = Uuid::new_v4();
        let v1 = Uuid::new_v4();
        let v2 = Uuid::new_v4();
        let store =
            MemoryCartStore::new(&[(product_id, true)], &[(v1, product_id), (v2, product_id)]);

        add_item(&store, None, product_id, Some(v1), 1).await.unwrap();
        add_item(&store, None, product_id, Some(v2), 1).await.unwrap();

        assert_eq!(store.rows().len(), 2);
    }

    #[tokio::test]
    async fn guest_and_user_rows_do_not_merge() {
        let product_id = Uuid::new_v4();
        let store = MemoryCartStore::new(&[(product_id, true)], &[]);

        add_item(&store, None, product_id, None, 1).await.unwrap();
        add_item(&store, Some(Uuid::new_v4()), product_id, None, 1).await.unwrap();

        assert_eq!(store.rows().len(), 2);
    }

    #[tokio::test]
    async fn missing_unpublished_or_foreign_lines_are_rejected() {
        let product_id = Uuid::new_v4();
        let hidden = Uuid::new_v4();
        let foreign_variant = Uuid::new_v4();
        let store = MemoryCartStore::new(
            &[(product_id, true), (hidden, false)],
            &[(foreign_variant, hidden)],
        );

        assert!(matches!(
            add_item(&store, None, Uuid::new_v4(), None, 1).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            add_item(&store, None, hidden, None, 1).await.unwrap_err(),
            AppError::Validation(_)
        ));
        assert!(matches!(
            add_item(&store, None, product_id, Some(foreign_variant), 1).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            add_item(&store, None, product_id, None, 0).await.unwrap_err(),
            AppError::Validation(_)
        ));
        assert!(store.rows().is_empty());
    }
}
