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
    models::{normalize_name, CreateNameRequest, Material, ADMIN_ROLES},
    query::{ListOptions, ListQuery, SortField},
    response::ApiResponse,
    AppState,
};

const MATERIAL_LIST: ListOptions = ListOptions {
    filterable: &[],
    searchable: &["name"],
    sortable: &[
        SortField::new("createdAt", "created_at"),
        SortField::new("name", "name"),
    ],
    selectable: &["id", "name", "createdAt"],
};

pub async fn list_materials(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<ApiResponse<Vec<serde_json::Value>>, AppError> {
    let q = ListQuery::parse(&params, &MATERIAL_LIST)?;
    let materials: Vec<Material> =
        q.build_select("materials").build_query_as().fetch_all(&state.db).await?;
    let total = q.fetch_total(&state.db, "materials").await?;
    let meta = q.meta(total);
    Ok(ApiResponse::list("Materials fetched", q.project(materials), meta))
}

pub async fn create_material(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Json(req): Json<CreateNameRequest>,
) -> Result<ApiResponse<Material>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let name = normalize_name(&req.name);
    if name.is_empty() {
        return Err(AppError::Validation("material name is required".to_string()));
    }
    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM materials WHERE name = $1)")
        .bind(&name)
        .fetch_one(&state.db)
        .await?;
    if taken {
        return Err(AppError::Conflict(format!("material '{name}' already exists")));
    }

    let material = sqlx::query_as::<_, Material>(
        "INSERT INTO materials (id, name, created_at) VALUES ($1, $2, NOW()) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&name)
    .fetch_one(&state.db)
    .await?;

    Ok(ApiResponse::created("Material created", material))
}

pub async fn update_material(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(material_id): Path<Uuid>,
    Json(req): Json<CreateNameRequest>,
) -> Result<ApiResponse<Material>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let name = normalize_name(&req.name);
    if name.is_empty() {
        return Err(AppError::Validation("material name is required".to_string()));
    }
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM materials WHERE name = $1 AND id <> $2)",
    )
    .bind(&name)
    .bind(material_id)
    .fetch_one(&state.db)
    .await?;
    if taken {
        return Err(AppError::Conflict(format!("material '{name}' already exists")));
    }

    let material = sqlx::query_as::<_, Material>(
        "UPDATE materials SET name = $2 WHERE id = $1 RETURNING *",
    )
    .bind(material_id)
    .bind(&name)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("material {material_id} does not exist")))?;

    Ok(ApiResponse::ok("Material updated", material))
}

pub async fn delete_material(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(material_id): Path<Uuid>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let linked: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE material_id = $1")
        .bind(material_id)
        .fetch_one(&state.db)
        .await?;
    if linked > 0 {
        return Err(AppError::Conflict(format!(
            "material still has {linked} product(s) and cannot be deleted"
        )));
    }

    let deleted = sqlx::query("DELETE FROM materials WHERE id = $1")
        .bind(material_id)
        .execute(&state.db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("material {material_id} does not exist")));
    }

    Ok(ApiResponse::ok("Material deleted", serde_json::json!(null)))
}
