use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::maybe_current_user,
    models::{AddToCartRequest, CartItem, CartItemDetail, UpdateCartItemRequest, STATUS_IN_CART},
    response::ApiResponse,
    services::cart::{add_item, PgCartStore},
    AppState,
};

// Guests carry a null user id; their rows are matched with
// IS NOT DISTINCT FROM so null compares equal to null.

pub async fn list_cart(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
) -> Result<ApiResponse<Vec<CartItemDetail>>, AppError> {
    let user_id = maybe_current_user(&headers, &cookies, &state.db).await.map(|u| u.id);

    let items = sqlx::query_as::<_, CartItemDetail>(
        r#"
        SELECT c.id, c.product_id, c.variant_id, c.quantity,
               p.name AS product_name, p.image_url,
               v.size, v.price,
               c.created_at
        FROM cart_items c
        JOIN products p ON p.id = c.product_id
        LEFT JOIN product_variants v ON v.id = c.variant_id
        WHERE c.user_id IS NOT DISTINCT FROM $1 AND c.status = $2
        ORDER BY c.created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(STATUS_IN_CART)
    .fetch_all(&state.db)
    .await?;

    Ok(ApiResponse::ok("Cart fetched", items))
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Json(req): Json<AddToCartRequest>,
) -> Result<ApiResponse<CartItem>, AppError> {
    let user_id = maybe_current_user(&headers, &cookies, &state.db).await.map(|u| u.id);

    let store = PgCartStore::new(state.db.clone());
    let item = add_item(
        &store,
        user_id,
        req.product_id,
        req.variant_id,
        req.quantity.unwrap_or(1),
    )
    .await?;

    Ok(ApiResponse::created("Added to cart", item))
}

pub async fn update_cart_item(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
    Json(req): Json<UpdateCartItemRequest>,
) -> Result<ApiResponse<CartItem>, AppError> {
    let user_id = maybe_current_user(&headers, &cookies, &state.db).await.map(|u| u.id);

    if req.quantity < 1 {
        return Err(AppError::Validation("quantity must be at least 1".to_string()));
    }

    let item = sqlx::query_as::<_, CartItem>(
        r#"
        UPDATE cart_items SET quantity = $3
        WHERE id = $1 AND user_id IS NOT DISTINCT FROM $2 AND status = $4
        RETURNING *
        "#,
    )
    .bind(item_id)
    .bind(user_id)
    .bind(req.quantity)
    .bind(STATUS_IN_CART)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("cart item {item_id} does not exist")))?;

    Ok(ApiResponse::ok("Cart item updated", item))
}

pub async fn remove_cart_item(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    let user_id = maybe_current_user(&headers, &cookies, &state.db).await.map(|u| u.id);

    let deleted = sqlx::query(
        "DELETE FROM cart_items WHERE id = $1 AND user_id IS NOT DISTINCT FROM $2",
    )
    .bind(item_id)
    .bind(user_id)
    .execute(&state.db)
    .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("cart item {item_id} does not exist")));
    }

    Ok(ApiResponse::ok("Removed from cart", serde_json::json!(null)))
}

pub async fn clear_cart(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    let user_id = maybe_current_user(&headers, &cookies, &state.db).await.map(|u| u.id);

    sqlx::query("DELETE FROM cart_items WHERE user_id IS NOT DISTINCT FROM $1 AND status = $2")
        .bind(user_id)
        .bind(STATUS_IN_CART)
        .execute(&state.db)
        .await?;

    Ok(ApiResponse::ok("Cart cleared", serde_json::json!(null)))
}
