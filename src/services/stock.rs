use async_trait::async_trait;
use uuid::Uuid;

use crate::{database::Database, error::AppError, models::StockLog};

#[derive(Debug, Clone)]
pub struct StockAdjustment {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub change: i32,
    pub reason: String,
    pub created_by: Option<Uuid>,
}

/// Storage seam for inventory adjustment. `apply_adjustment` must mutate
/// the product's stock counter and append the ledger row as one atomic
/// unit; neither write may exist without the other.
#[async_trait]
pub trait StockStore {
    async fn product_exists(&self, product_id: Uuid) -> Result<bool, AppError>;
    async fn variant_belongs_to(
        &self,
        variant_id: Uuid,
        product_id: Uuid,
    ) -> Result<bool, AppError>;
    async fn apply_adjustment(&self, adjustment: &StockAdjustment) -> Result<StockLog, AppError>;
}

/// Validates the adjustment and applies it. All precondition failures
/// surface before any write happens.
pub async fn add_stock<S: StockStore>(
    store: &S,
    adjustment: StockAdjustment,
) -> Result<StockLog, AppError> {
    if adjustment.change == 0 {
        return Err(AppError::Validation("change must be non-zero".to_string()));
    }
    if adjustment.reason.trim().is_empty() {
        return Err(AppError::Validation("a reason is required".to_string()));
    }
    if !store.product_exists(adjustment.product_id).await? {
        return Err(AppError::NotFound(format!(
            "product {} does not exist",
            adjustment.product_id
        )));
    }
    if let Some(variant_id) = adjustment.variant_id {
        if !store.variant_belongs_to(variant_id, adjustment.product_id).await? {
            return Err(AppError::NotFound(format!(
                "variant {} does not belong to product {}",
                variant_id, adjustment.product_id
            )));
        }
    }

    store.apply_adjustment(&adjustment).await
}

pub struct PgStockStore {
    db: Database,
}

impl PgStockStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StockStore for PgStockStore {
    async fn product_exists(&self, product_id: Uuid) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(product_id)
            .fetch_one(&self.db)
            .await?;
        Ok(exists)
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

    async fn apply_adjustment(&self, adjustment: &StockAdjustment) -> Result<StockLog, AppError> {
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            "UPDATE products SET stock = stock + $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(adjustment.change)
        .bind(adjustment.product_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "product {} does not exist",
                adjustment.product_id
            )));
        }

        let log = sqlx::query_as::<_, StockLog>(
            r#"
            INSERT INTO stock_logs (id, product_id, variant_id, change, reason, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(adjustment.product_id)
        .bind(adjustment.variant_id)
        .bind(adjustment.change)
        .bind(&adjustment.reason)
        .bind(adjustment.created_by)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemoryStockStore {
        stock: Mutex<HashMap<Uuid, i32>>,
        variants: HashMap<Uuid, Uuid>, // variant -> product
        logs: Mutex<Vec<StockLog>>,
        fail_log_append: bool,
    }

    impl MemoryStockStore {
        fn new(products: &[(Uuid, i32)], variants: &[(Uuid, Uuid)]) -> Self {
            Self {
                stock: Mutex::new(products.iter().copied().collect()),
                variants: variants.iter().copied().collect(),
                logs: Mutex::new(Vec::new()),
                fail_log_append: false,
            }
        }

        fn stock_of(&self, product_id: Uuid) -> i32 {
            self.stock.lock().unwrap()[&product_id]
        }
    }

    #[async_trait]
    impl StockStore for MemoryStockStore {
        async fn product_exists(&self, product_id: Uuid) -> Result<bool, AppError> {
            Ok(self.stock.lock().unwrap().contains_key(&product_id))
        }

        async fn variant_belongs_to(
            &self,
            variant_id: Uuid,
            product_id: Uuid,
        ) -> Result<bool, AppError> {
            Ok(self.variants.get(&variant_id) == Some(&product_id))
        }

        async fn apply_adjustment(
            &self,
            adjustment: &StockAdjustment,
        ) -> Result<StockLog, AppError> {
            let mut stock = self.stock.lock().unwrap();
            let counter = stock
                .get_mut(&adjustment.product_id)
                .ok_or_else(|| AppError::NotFound("product vanished".to_string()))?;
            *counter += adjustment.change;
            if self.fail_log_append {
                // Mirrors the transactional store: a failed ledger append
                // rolls the counter mutation back with it.
                *counter -= adjustment.change;
                return Err(AppError::Internal("ledger write failed".to_string()));
            }
            let log = StockLog {
                id: Uuid::new_v4(),
                product_id: adjustment.product_id,
                variant_id: adjustment.variant_id,
                change: adjustment.change,
                reason: adjustment.reason.clone(),
                created_by: adjustment.created_by,
                created_at: Utc::now(),
            };
            self.logs.lock().unwrap().push(log.clone());
            Ok(log)
        }
    }

    fn adjustment(product_id: Uuid, change: i32, reason: &str) -> StockAdjustment {
        StockAdjustment {
            product_id,
            variant_id: None,
            change,
            reason: reason.to_string(),
            created_by: None,
        }
    }

    #[tokio::test]
    async fn adjustment_moves_counter_and_appends_one_log_row() {
        let product_id = Uuid::new_v4();
        let store = MemoryStockStore::new(&[(product_id, 10)], &[]);

        let log = add_stock(&store, adjustment(product_id, -5, "damage")).await.unwrap();

        assert_eq!(store.stock_of(product_id), 5);
        assert_eq!(log.change, -5);
        assert_eq!(log.reason, "damage");
        assert_eq!(store.logs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_ledger_append_leaves_no_counter_change() {
        let product_id = Uuid::new_v4();
        let mut store = MemoryStockStore::new(&[(product_id, 10)], &[]);
        store.fail_log_append = true;

        let err = add_stock(&store, adjustment(product_id, -5, "damage")).await.unwrap_err();

        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(store.stock_of(product_id), 10);
        assert!(store.logs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_product_fails_before_any_write() {
        let store = MemoryStockStore::new(&[], &[]);
        let err = add_stock(&store, adjustment(Uuid::new_v4(), 5, "restock"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.logs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn foreign_variant_fails_before_any_write() {
        let product_id = Uuid::new_v4();
        let other_product = Uuid::new_v4();
        let variant_id = Uuid::new_v4();
        let store = MemoryStockStore::new(
            &[(product_id, 10), (other_product, 3)],
            &[(variant_id, other_product)],
        );

        let mut adj = adjustment(product_id, 2, "restock");
        adj.variant_id = Some(variant_id);
        let err = add_stock(&store, adj).await.unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(store.stock_of(product_id), 10);
        assert!(store.logs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_change_and_blank_reason_are_rejected() {
        let product_id = Uuid::new_v4();
        let store = MemoryStockStore::new(&[(product_id, 10)], &[]);

        assert!(matches!(
            add_stock(&store, adjustment(product_id, 0, "noop")).await.unwrap_err(),
            AppError::Validation(_)
        ));
        assert!(matches!(
            add_stock(&store, adjustment(product_id, 3, "  ")).await.unwrap_err(),
            AppError::Validation(_)
        ));
        assert_eq!(store.stock_of(product_id), 10);
        assert!(store.logs.lock().unwrap().is_empty());
    }
}
