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
    models::{normalize_name, CreateNameRequest, Fragrance, ADMIN_ROLES},
    query::{ListOptions, ListQuery, SortField},
    response::ApiResponse,
    AppState,
};

const FRAGRANCE_LIST: ListOptions = ListOptions {
    filterable: &[],
    searchable: &["name"],
    sortable: &[
        SortField::new("createdAt", "created_at"),
        SortField::new("name", "name"),
    ],
    selectable: &["id", "name", "createdAt"],
};

pub async fn list_fragrances(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<ApiResponse<Vec<serde_json::Value>>, AppError> {
    let q = ListQuery::parse(&params, &FRAGRANCE_LIST)?;
    let fragrances: Vec<Fragrance> =
        q.build_select("fragrances").build_query_as().fetch_all(&state.db).await?;
    let total = q.fetch_total(&state.db, "fragrances").await?;
    let meta = q.meta(total);
    Ok(ApiResponse::list("Fragrances fetched", q.project(fragrances), meta))
}

pub async fn create_fragrance(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Json(req): Json<CreateNameRequest>,
) -> Result<ApiResponse<Fragrance>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let name = normalize_name(&req.name);
    if name.is_empty() {
        return Err(AppError::Validation("fragrance name is required".to_string()));
    }
    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM fragrances WHERE name = $1)")
        .bind(&name)
        .fetch_one(&state.db)
        .await?;
    if taken {
        return Err(AppError::Conflict(format!("fragrance '{name}' already exists")));
    }

    let fragrance = sqlx::query_as::<_, Fragrance>(
        "INSERT INTO fragrances (id, name, created_at) VALUES ($1, $2, NOW()) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&name)
    .fetch_one(&state.db)
    .await?;

    Ok(ApiResponse::created("Fragrance created", fragrance))
}

pub async fn update_fragrance(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(fragrance_id): Path<Uuid>,
    Json(req): Json<CreateNameRequest>,
) -> Result<ApiResponse<Fragrance>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let name = normalize_name(&req.name);
    if name.is_empty() {
        return Err(AppError::Validation("fragrance name is required".to_string()));
    }
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM fragrances WHERE name = $1 AND id <> $2)",
    )
    .bind(&name)
    .bind(fragrance_id)
    .fetch_one(&state.db)
    .await?;
    if taken {
        return Err(AppError::Conflict(format!("fragrance '{name}' already exists")));
    }

    let fragrance = sqlx::query_as::<_, Fragrance>(
        "UPDATE fragrances SET name = $2 WHERE id = $1 RETURNING *",
    )
    .bind(fragrance_id)
    .bind(&name)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("fragrance {fragrance_id} does not exist")))?;

    Ok(ApiResponse::ok("Fragrance updated", fragrance))
}

pub async fn delete_fragrance(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(fragrance_id): Path<Uuid>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let linked: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE fragrance_id = $1")
        .bind(fragrance_id)
        .fetch_one(&state.db)
        .await?;
    if linked > 0 {
        return Err(AppError::Conflict(format!(
            "fragrance still has {linked} product(s) and cannot be deleted"
        )));
    }

    let deleted = sqlx::query("DELETE FROM fragrances WHERE id = $1")
        .bind(fragrance_id)
        .execute(&state.db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("fragrance {fragrance_id} does not exist")));
    }

    Ok(ApiResponse::ok("Fragrance deleted", serde_json::json!(null)))
}
