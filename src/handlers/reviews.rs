use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::{get_current_user, maybe_current_user},
    models::{CreateReviewRequest, Review, ReviewWithAuthor, UpdateReviewRequest, ADMIN_ROLES},
    query::{FilterField, FilterValue, ListOptions, ListQuery, SortField},
    response::ApiResponse,
    AppState,
};

const REVIEW_LIST: ListOptions = ListOptions {
    filterable: &[
        FilterField::int("rating", "rating"),
        FilterField::boolean("published", "published"),
    ],
    searchable: &["comment"],
    sortable: &[
        SortField::new("createdAt", "created_at"),
        SortField::new("rating", "rating"),
    ],
    selectable: &["id", "productId", "userId", "authorName", "rating", "comment", "published", "createdAt"],
};

const REVIEW_SELECT: &str =
    "reviews.*, (SELECT name FROM users WHERE users.id = reviews.user_id) AS author_name";

pub async fn list_product_reviews(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(product_id): Path<Uuid>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<ApiResponse<Vec<serde_json::Value>>, AppError> {
    let mut q = ListQuery::parse(&params, &REVIEW_LIST)?;
    q.and_eq("product_id", FilterValue::Uuid(product_id));

    let is_admin = match maybe_current_user(&headers, &cookies, &state.db).await {
        Some(user) => user.require_role(ADMIN_ROLES).is_ok(),
        None => false,
    };
    if !is_admin {
        q.and_eq("published", FilterValue::Bool(true));
    }

    let reviews: Vec<ReviewWithAuthor> = q
        .build_select_from(REVIEW_SELECT, "reviews")
        .build_query_as()
        .fetch_all(&state.db)
        .await?;
    let total = q.fetch_total(&state.db, "reviews").await?;
    let meta = q.meta(total);
    Ok(ApiResponse::list("Reviews fetched", q.project(reviews), meta))
}

pub async fn my_reviews(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<ApiResponse<Vec<serde_json::Value>>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;

    let mut q = ListQuery::parse(&params, &REVIEW_LIST)?;
    q.and_eq("user_id", FilterValue::Uuid(current.id));

    let reviews: Vec<Review> =
        q.build_select("reviews").build_query_as().fetch_all(&state.db).await?;
    let total = q.fetch_total(&state.db, "reviews").await?;
    let meta = q.meta(total);
    Ok(ApiResponse::list("Reviews fetched", q.project(reviews), meta))
}

pub async fn create_review(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Json(req): Json<CreateReviewRequest>,
) -> Result<ApiResponse<Review>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;

    if !(1..=5).contains(&req.rating) {
        return Err(AppError::Validation("rating must be between 1 and 5".to_string()));
    }

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
        .bind(req.product_id)
        .fetch_one(&state.db)
        .await?;
    if !exists {
        return Err(AppError::NotFound(format!("product {} does not exist", req.product_id)));
    }

    let already: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM reviews WHERE product_id = $1 AND user_id = $2)",
    )
    .bind(req.product_id)
    .bind(current.id)
    .fetch_one(&state.db)
    .await?;
    if already {
        return Err(AppError::Conflict("you have already reviewed this product".to_string()));
    }

    let review = sqlx::query_as::<_, Review>(
        r#"
        INSERT INTO reviews (id, product_id, user_id, rating, comment, published, created_at)
        VALUES ($1, $2, $3, $4, $5, true, NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(req.product_id)
    .bind(current.id)
    .bind(req.rating)
    .bind(req.comment.trim())
    .fetch_one(&state.db)
    .await?;

    Ok(ApiResponse::created("Review created", review))
}

pub async fn update_review(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(review_id): Path<Uuid>,
    Json(req): Json<UpdateReviewRequest>,
) -> Result<ApiResponse<Review>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;

    if let Some(rating) = req.rating {
        if !(1..=5).contains(&rating) {
            return Err(AppError::Validation("rating must be between 1 and 5".to_string()));
        }
    }

    let review = sqlx::query_as::<_, Review>(
        r#"
        UPDATE reviews
        SET rating = COALESCE($3, rating),
            comment = COALESCE($4, comment)
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(review_id)
    .bind(current.id)
    .bind(req.rating)
    .bind(req.comment.as_deref().map(str::trim))
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("review {review_id} does not exist")))?;

    Ok(ApiResponse::ok("Review updated", review))
}

pub async fn delete_review(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(review_id): Path<Uuid>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;

    let deleted = if current.require_role(ADMIN_ROLES).is_ok() {
        sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(review_id)
            .execute(&state.db)
            .await?
    } else {
        sqlx::query("DELETE FROM reviews WHERE id = $1 AND user_id = $2")
            .bind(review_id)
            .bind(current.id)
            .execute(&state.db)
            .await?
    };
    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("review {review_id} does not exist")));
    }

    Ok(ApiResponse::ok("Review deleted", serde_json::json!(null)))
}

#[derive(Debug, Deserialize)]
pub struct PublishReviewRequest {
    pub published: bool,
}

pub async fn set_review_published(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(review_id): Path<Uuid>,
    Json(req): Json<PublishReviewRequest>,
) -> Result<ApiResponse<Review>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let review = sqlx::query_as::<_, Review>(
        "UPDATE reviews SET published = $2 WHERE id = $1 RETURNING *",
    )
    .bind(review_id)
    .bind(req.published)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("review {review_id} does not exist")))?;

    Ok(ApiResponse::ok("Review visibility updated", review))
}
