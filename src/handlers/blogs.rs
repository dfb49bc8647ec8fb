use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use axum_extra::extract::Multipart;
use std::collections::HashMap;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::{get_current_user, maybe_current_user},
    models::{blog::slugify, Blog, CreateBlogRequest, UpdateBlogRequest, ADMIN_ROLES},
    query::{FilterField, FilterValue, ListOptions, ListQuery, SortField},
    response::ApiResponse,
    utils::{delete_image, parse_image_multipart, save_image},
    AppState,
};

const BLOG_LIST: ListOptions = ListOptions {
    filterable: &[FilterField::boolean("published", "published")],
    searchable: &["title", "content"],
    sortable: &[
        SortField::new("createdAt", "created_at"),
        SortField::new("title", "title"),
    ],
    selectable: &["id", "title", "slug", "content", "imageUrl", "published", "createdAt"],
};

pub async fn list_blogs(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<ApiResponse<Vec<serde_json::Value>>, AppError> {
    let mut q = ListQuery::parse(&params, &BLOG_LIST)?;

    let is_admin = match maybe_current_user(&headers, &cookies, &state.db).await {
        Some(user) => user.require_role(ADMIN_ROLES).is_ok(),
        None => false,
    };
    if !is_admin {
        q.and_eq("published", FilterValue::Bool(true));
    }

    let blogs: Vec<Blog> = q.build_select("blogs").build_query_as().fetch_all(&state.db).await?;
    let total = q.fetch_total(&state.db, "blogs").await?;
    let meta = q.meta(total);
    Ok(ApiResponse::list("Blogs fetched", q.project(blogs), meta))
}

/// Accepts either a row id or a slug, so public permalinks and the admin
/// panel share one endpoint.
pub async fn get_blog(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(id_or_slug): Path<String>,
) -> Result<ApiResponse<Blog>, AppError> {
    let blog = match Uuid::parse_str(&id_or_slug) {
        Ok(id) => {
            sqlx::query_as::<_, Blog>("SELECT * FROM blogs WHERE id = $1")
                .bind(id)
                .fetch_optional(&state.db)
                .await?
        }
        Err(_) => {
            sqlx::query_as::<_, Blog>("SELECT * FROM blogs WHERE slug = $1")
                .bind(&id_or_slug)
                .fetch_optional(&state.db)
                .await?
        }
    }
    .ok_or_else(|| AppError::NotFound(format!("blog '{id_or_slug}' does not exist")))?;

    if !blog.published {
        let is_admin = match maybe_current_user(&headers, &cookies, &state.db).await {
            Some(user) => user.require_role(ADMIN_ROLES).is_ok(),
            None => false,
        };
        if !is_admin {
            return Err(AppError::NotFound(format!("blog '{id_or_slug}' does not exist")));
        }
    }

    Ok(ApiResponse::ok("Blog fetched", blog))
}

pub async fn create_blog(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Json(req): Json<CreateBlogRequest>,
) -> Result<ApiResponse<Blog>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    if req.title.trim().is_empty() || req.content.trim().is_empty() {
        return Err(AppError::Validation("title and content are required".to_string()));
    }

    let slug = slugify(&req.title);
    if slug.is_empty() {
        return Err(AppError::Validation("title must contain letters or digits".to_string()));
    }
    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM blogs WHERE slug = $1)")
        .bind(&slug)
        .fetch_one(&state.db)
        .await?;
    if taken {
        return Err(AppError::Conflict(format!("a blog with slug '{slug}' already exists")));
    }

    let blog = sqlx::query_as::<_, Blog>(
        r#"
        INSERT INTO blogs (id, title, slug, content, published, author_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, false, $5, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(req.title.trim())
    .bind(&slug)
    .bind(&req.content)
    .bind(current.id)
    .fetch_one(&state.db)
    .await?;

    Ok(ApiResponse::created("Blog created", blog))
}

pub async fn update_blog(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(blog_id): Path<Uuid>,
    Json(req): Json<UpdateBlogRequest>,
) -> Result<ApiResponse<Blog>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    // The slug is a permalink; renaming the title does not move it.
    let blog = sqlx::query_as::<_, Blog>(
        r#"
        UPDATE blogs
        SET title = COALESCE($2, title),
            content = COALESCE($3, content),
            published = COALESCE($4, published),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(blog_id)
    .bind(req.title.as_deref().map(str::trim))
    .bind(&req.content)
    .bind(req.published)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("blog {blog_id} does not exist")))?;

    Ok(ApiResponse::ok("Blog updated", blog))
}

pub async fn upload_blog_image(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(blog_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<ApiResponse<Blog>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let (_, image) = parse_image_multipart(multipart).await?;
    let image = image.ok_or_else(|| AppError::Validation("an image file is required".to_string()))?;

    let old_url: Option<Option<String>> =
        sqlx::query_scalar("SELECT image_url FROM blogs WHERE id = $1")
            .bind(blog_id)
            .fetch_optional(&state.db)
            .await?;
    let old_url =
        old_url.ok_or_else(|| AppError::NotFound(format!("blog {blog_id} does not exist")))?;

    let url = save_image("blogs", image).await?;
    let blog = sqlx::query_as::<_, Blog>(
        "UPDATE blogs SET image_url = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(blog_id)
    .bind(&url)
    .fetch_one(&state.db)
    .await?;

    if let Some(old) = old_url {
        delete_image(&old).await;
    }

    Ok(ApiResponse::ok("Blog image updated", blog))
}

pub async fn delete_blog(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(blog_id): Path<Uuid>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let image_url: Option<Option<String>> =
        sqlx::query_scalar("DELETE FROM blogs WHERE id = $1 RETURNING image_url")
            .bind(blog_id)
            .fetch_optional(&state.db)
            .await?;
    let image_url =
        image_url.ok_or_else(|| AppError::NotFound(format!("blog {blog_id} does not exist")))?;

    if let Some(url) = image_url {
        delete_image(&url).await;
    }

    Ok(ApiResponse::ok("Blog deleted", serde_json::json!(null)))
}
