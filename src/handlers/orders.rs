use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use std::collections::HashMap;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::get_current_user,
    models::{
        Order, OrderDetail, OrderItem, UpdateOrderStatusRequest, ADMIN_ROLES, ORDER_STATUSES,
    },
    query::{FilterField, FilterValue, ListOptions, ListQuery, SortField},
    response::ApiResponse,
    AppState,
};

const ORDER_LIST: ListOptions = ListOptions {
    filterable: &[
        FilterField::text("status", "status"),
        FilterField::text("email", "email"),
    ],
    searchable: &["order_number", "email", "customer_name"],
    sortable: &[
        SortField::new("createdAt", "created_at"),
        SortField::new("amountPaid", "amount_paid"),
    ],
    selectable: &[
        "id", "orderNumber", "customerName", "email", "phone", "shippingAddress", "amountPaid",
        "currency", "status", "createdAt",
    ],
};

pub async fn list_orders(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<ApiResponse<Vec<serde_json::Value>>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let q = ListQuery::parse(&params, &ORDER_LIST)?;
    let orders: Vec<Order> =
        q.build_select("orders").build_query_as().fetch_all(&state.db).await?;
    let total = q.fetch_total(&state.db, "orders").await?;
    let meta = q.meta(total);
    Ok(ApiResponse::list("Orders fetched", q.project(orders), meta))
}

pub async fn my_orders(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<ApiResponse<Vec<serde_json::Value>>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;

    let mut q = ListQuery::parse(&params, &ORDER_LIST)?;
    q.and_eq("user_id", FilterValue::Uuid(current.id));

    let orders: Vec<Order> =
        q.build_select("orders").build_query_as().fetch_all(&state.db).await?;
    let total = q.fetch_total(&state.db, "orders").await?;
    let meta = q.meta(total);
    Ok(ApiResponse::list("Orders fetched", q.project(orders), meta))
}

pub async fn get_order(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
) -> Result<ApiResponse<OrderDetail>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;

    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} does not exist")))?;

    if order.user_id != Some(current.id) && current.require_role(ADMIN_ROLES).is_err() {
        return Err(AppError::Forbidden("this is not your order".to_string()));
    }

    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY product_name",
    )
    .bind(order_id)
    .fetch_all(&state.db)
    .await?;

    Ok(ApiResponse::ok("Order fetched", OrderDetail { order, items }))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Result<ApiResponse<Order>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    if !ORDER_STATUSES.iter().any(|s| *s == req.status) {
        return Err(AppError::Validation(format!(
            "status must be one of {}",
            ORDER_STATUSES.join(", ")
        )));
    }

    let order = sqlx::query_as::<_, Order>(
        "UPDATE orders SET status = $2 WHERE id = $1 RETURNING *",
    )
    .bind(order_id)
    .bind(&req.status)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("order {order_id} does not exist")))?;

    Ok(ApiResponse::ok("Order status updated", order))
}
