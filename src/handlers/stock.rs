use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use std::collections::HashMap;
use tower_cookies::Cookies;

use crate::{
    error::AppError,
    middleware::get_current_user,
    models::{AddStockRequest, StockLog, ADMIN_ROLES},
    query::{FilterField, ListOptions, ListQuery, SortField},
    response::ApiResponse,
    services::stock::{add_stock, PgStockStore, StockAdjustment},
    AppState,
};

const STOCK_LOG_LIST: ListOptions = ListOptions {
    filterable: &[
        FilterField::uuid("productId", "product_id"),
        FilterField::uuid("variantId", "variant_id"),
    ],
    searchable: &["reason"],
    sortable: &[
        SortField::new("createdAt", "created_at"),
        SortField::new("change", "change"),
    ],
    selectable: &["id", "productId", "variantId", "change", "reason", "createdBy", "createdAt"],
};

pub async fn adjust_stock(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Json(req): Json<AddStockRequest>,
) -> Result<ApiResponse<StockLog>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let store = PgStockStore::new(state.db.clone());
    let log = add_stock(
        &store,
        StockAdjustment {
            product_id: req.product_id,
            variant_id: req.variant_id,
            change: req.change,
            reason: req.reason,
            created_by: Some(current.id),
        },
    )
    .await?;

    Ok(ApiResponse::created("Stock adjusted", log))
}

pub async fn list_stock_logs(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<ApiResponse<Vec<serde_json::Value>>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let q = ListQuery::parse(&params, &STOCK_LOG_LIST)?;
    let logs: Vec<StockLog> =
        q.build_select("stock_logs").build_query_as().fetch_all(&state.db).await?;
    let total = q.fetch_total(&state.db, "stock_logs").await?;
    let meta = q.meta(total);
    Ok(ApiResponse::list("Stock logs fetched", q.project(logs), meta))
}
