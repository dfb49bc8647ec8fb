use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::get_current_user,
    models::{AddToWishlistRequest, WishlistEntry, WishlistItem},
    response::ApiResponse,
    AppState,
};

pub async fn list_wishlist(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
) -> Result<ApiResponse<Vec<WishlistEntry>>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;

    let entries = sqlx::query_as::<_, WishlistEntry>(
        r#"
        SELECT w.id, w.product_id, p.name AS product_name, p.image_url, p.published, w.created_at
        FROM wishlist_items w
        JOIN products p ON p.id = w.product_id
        WHERE w.user_id = $1
        ORDER BY w.created_at DESC
        "#,
    )
    .bind(current.id)
    .fetch_all(&state.db)
    .await?;

    Ok(ApiResponse::ok("Wishlist fetched", entries))
}

pub async fn add_to_wishlist(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Json(req): Json<AddToWishlistRequest>,
) -> Result<ApiResponse<WishlistItem>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
        .bind(req.product_id)
        .fetch_one(&state.db)
        .await?;
    if !exists {
        return Err(AppError::NotFound(format!("product {} does not exist", req.product_id)));
    }

    let already: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM wishlist_items WHERE user_id = $1 AND product_id = $2)",
    )
    .bind(current.id)
    .bind(req.product_id)
    .fetch_one(&state.db)
    .await?;
    if already {
        return Err(AppError::Conflict("product is already in your wishlist".to_string()));
    }

    let item = sqlx::query_as::<_, WishlistItem>(
        r#"
        INSERT INTO wishlist_items (id, user_id, product_id, created_at)
        VALUES ($1, $2, $3, NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(current.id)
    .bind(req.product_id)
    .fetch_one(&state.db)
    .await?;

    Ok(ApiResponse::created("Added to wishlist", item))
}

pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(product_id): Path<Uuid>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;

    let deleted = sqlx::query(
        "DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2",
    )
    .bind(current.id)
    .bind(product_id)
    .execute(&state.db)
    .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound("product is not in your wishlist".to_string()));
    }

    Ok(ApiResponse::ok("Removed from wishlist", serde_json::json!(null)))
}
