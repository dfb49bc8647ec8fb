use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
};
use axum_extra::extract::Multipart;
use std::collections::HashMap;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::get_current_user,
    models::{normalize_name, Category, ADMIN_ROLES},
    query::{ListOptions, ListQuery, SortField},
    response::ApiResponse,
    utils::{delete_image, parse_image_multipart, save_image},
    AppState,
};

const CATEGORY_LIST: ListOptions = ListOptions {
    filterable: &[],
    searchable: &["name"],
    sortable: &[
        SortField::new("createdAt", "created_at"),
        SortField::new("name", "name"),
    ],
    selectable: &["id", "name", "imageUrl", "createdAt"],
};

pub async fn list_categories(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<ApiResponse<Vec<serde_json::Value>>, AppError> {
    let q = ListQuery::parse(&params, &CATEGORY_LIST)?;
    let categories: Vec<Category> =
        q.build_select("categories").build_query_as().fetch_all(&state.db).await?;
    let total = q.fetch_total(&state.db, "categories").await?;
    let meta = q.meta(total);
    Ok(ApiResponse::list("Categories fetched", q.project(categories), meta))
}

pub async fn create_category(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<ApiResponse<Category>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let (fields, image) = parse_image_multipart(multipart).await?;
    let name = fields
        .get("name")
        .map(|n| normalize_name(n))
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::Validation("category name is required".to_string()))?;

    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE name = $1)")
        .bind(&name)
        .fetch_one(&state.db)
        .await?;
    if taken {
        return Err(AppError::Conflict(format!("category '{name}' already exists")));
    }

    let image_url = match image {
        Some(image) => Some(save_image("categories", image).await?),
        None => None,
    };

    let category = sqlx::query_as::<_, Category>(
        "INSERT INTO categories (id, name, image_url, created_at) VALUES ($1, $2, $3, NOW()) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&name)
    .bind(&image_url)
    .fetch_one(&state.db)
    .await?;

    Ok(ApiResponse::created("Category created", category))
}

pub async fn update_category(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(category_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<ApiResponse<Category>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let existing = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
        .bind(category_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("category {category_id} does not exist")))?;

    let (fields, image) = parse_image_multipart(multipart).await?;

    let name = match fields.get("name") {
        Some(raw) => {
            let name = normalize_name(raw);
            if name.is_empty() {
                return Err(AppError::Validation("category name cannot be empty".to_string()));
            }
            if name != existing.name {
                let taken: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE name = $1)")
                        .bind(&name)
                        .fetch_one(&state.db)
                        .await?;
                if taken {
                    return Err(AppError::Conflict(format!("category '{name}' already exists")));
                }
            }
            name
        }
        None => existing.name.clone(),
    };

    let image_url = match image {
        Some(image) => Some(save_image("categories", image).await?),
        None => existing.image_url.clone(),
    };

    let category = sqlx::query_as::<_, Category>(
        "UPDATE categories SET name = $2, image_url = $3 WHERE id = $1 RETURNING *",
    )
    .bind(category_id)
    .bind(&name)
    .bind(&image_url)
    .fetch_one(&state.db)
    .await?;

    // Replaced image: the old file is orphaned now.
    if let (Some(old), true) = (&existing.image_url, image_url != existing.image_url) {
        delete_image(old).await;
    }

    Ok(ApiResponse::ok("Category updated", category))
}

pub async fn delete_category(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(category_id): Path<Uuid>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let linked: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE category_id = $1")
        .bind(category_id)
        .fetch_one(&state.db)
        .await?;
    if linked > 0 {
        return Err(AppError::Conflict(format!(
            "category still has {linked} product(s) and cannot be deleted"
        )));
    }

    let image_url: Option<Option<String>> =
        sqlx::query_scalar("DELETE FROM categories WHERE id = $1 RETURNING image_url")
            .bind(category_id)
            .fetch_optional(&state.db)
            .await?;
    let image_url = image_url
        .ok_or_else(|| AppError::NotFound(format!("category {category_id} does not exist")))?;

    if let Some(url) = image_url {
        delete_image(&url).await;
    }

    Ok(ApiResponse::ok("Category deleted", serde_json::json!(null)))
}
