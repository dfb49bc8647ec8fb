use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use axum_extra::extract::Multipart;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::{get_current_user, maybe_current_user},
    models::{
        CreateProductRequest, CreateVariantRequest, Product, ProductDetail, ProductVariant,
        UpdateProductRequest, ADMIN_ROLES,
    },
    query::{FilterField, FilterValue, ListOptions, ListQuery, SortField},
    response::ApiResponse,
    utils::{delete_image, parse_image_multipart, save_image},
    AppState,
};

const PRODUCT_LIST: ListOptions = ListOptions {
    filterable: &[
        FilterField::uuid("categoryId", "category_id"),
        FilterField::uuid("materialId", "material_id"),
        FilterField::uuid("fragranceId", "fragrance_id"),
        FilterField::boolean("published", "published"),
    ],
    searchable: &["name", "description"],
    sortable: &[
        SortField::new("createdAt", "created_at"),
        SortField::new("name", "name"),
        SortField::new("sales", "sales"),
        SortField::new("stock", "stock"),
    ],
    selectable: &[
        "id", "name", "description", "categoryId", "materialId", "fragranceId", "imageUrl",
        "stock", "sales", "published", "createdAt",
    ],
};

fn validate_variant(variant: &CreateVariantRequest) -> Result<(), AppError> {
    if variant.sku.trim().is_empty() || variant.size.trim().is_empty() {
        return Err(AppError::Validation("variant sku and size are required".to_string()));
    }
    if variant.price <= Decimal::ZERO {
        return Err(AppError::Validation("variant price must be positive".to_string()));
    }
    if variant.quantity < 0 {
        return Err(AppError::Validation("variant quantity cannot be negative".to_string()));
    }
    Ok(())
}

pub async fn list_products(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<ApiResponse<Vec<serde_json::Value>>, AppError> {
    let mut q = ListQuery::parse(&params, &PRODUCT_LIST)?;

    // Anonymous and customer traffic only ever sees the published catalog.
    let is_admin = match maybe_current_user(&headers, &cookies, &state.db).await {
        Some(user) => user.require_role(ADMIN_ROLES).is_ok(),
        None => false,
    };
    if !is_admin {
        q.and_eq("published", FilterValue::Bool(true));
    }

    let products: Vec<Product> =
        q.build_select("products").build_query_as().fetch_all(&state.db).await?;
    let total = q.fetch_total(&state.db, "products").await?;
    let meta = q.meta(total);
    Ok(ApiResponse::list("Products fetched", q.project(products), meta))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<ApiResponse<ProductDetail>, AppError> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {product_id} does not exist")))?;

    let variants = sqlx::query_as::<_, ProductVariant>(
        "SELECT * FROM product_variants WHERE product_id = $1 ORDER BY price",
    )
    .bind(product_id)
    .fetch_all(&state.db)
    .await?;

    Ok(ApiResponse::ok("Product fetched", ProductDetail { product, variants }))
}

pub async fn create_product(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Json(req): Json<CreateProductRequest>,
) -> Result<ApiResponse<ProductDetail>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    if req.name.trim().is_empty() {
        return Err(AppError::Validation("product name is required".to_string()));
    }
    if req.variants.is_empty() {
        return Err(AppError::Validation("at least one variant is required".to_string()));
    }
    for variant in &req.variants {
        validate_variant(variant)?;
    }

    let category_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
            .bind(req.category_id)
            .fetch_one(&state.db)
            .await?;
    if !category_exists {
        return Err(AppError::NotFound(format!(
            "category {} does not exist",
            req.category_id
        )));
    }

    let initial_stock: i32 = req.variants.iter().map(|v| v.quantity).sum();

    let product = sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (id, name, description, category_id, material_id, fragrance_id,
                              stock, sales, published, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 0, false, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(req.name.trim())
    .bind(&req.description)
    .bind(req.category_id)
    .bind(req.material_id)
    .bind(req.fragrance_id)
    .bind(initial_stock)
    .fetch_one(&state.db)
    .await?;

    let mut variants = Vec::with_capacity(req.variants.len());
    for variant in &req.variants {
        let row = sqlx::query_as::<_, ProductVariant>(
            r#"
            INSERT INTO product_variants (id, product_id, sku, size, price, quantity)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(product.id)
        .bind(variant.sku.trim())
        .bind(variant.size.trim())
        .bind(variant.price)
        .bind(variant.quantity)
        .fetch_one(&state.db)
        .await?;
        variants.push(row);
    }

    Ok(ApiResponse::created("Product created", ProductDetail { product, variants }))
}

pub async fn update_product(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(product_id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<ApiResponse<Product>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    if let Some(category_id) = req.category_id {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
                .bind(category_id)
                .fetch_one(&state.db)
                .await?;
        if !exists {
            return Err(AppError::NotFound(format!("category {category_id} does not exist")));
        }
    }

    let product = sqlx::query_as::<_, Product>(
        r#"
        UPDATE products
        SET name = COALESCE($2, name),
            description = COALESCE($3, description),
            category_id = COALESCE($4, category_id),
            material_id = COALESCE($5, material_id),
            fragrance_id = COALESCE($6, fragrance_id),
            published = COALESCE($7, published),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(product_id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.description)
    .bind(req.category_id)
    .bind(req.material_id)
    .bind(req.fragrance_id)
    .bind(req.published)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("product {product_id} does not exist")))?;

    Ok(ApiResponse::ok("Product updated", product))
}

pub async fn upload_product_image(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(product_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<ApiResponse<Product>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let (_, image) = parse_image_multipart(multipart).await?;
    let image = image.ok_or_else(|| AppError::Validation("an image file is required".to_string()))?;

    let old_url: Option<Option<String>> =
        sqlx::query_scalar("SELECT image_url FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&state.db)
            .await?;
    let old_url =
        old_url.ok_or_else(|| AppError::NotFound(format!("product {product_id} does not exist")))?;

    let url = save_image("products", image).await?;
    let product = sqlx::query_as::<_, Product>(
        "UPDATE products SET image_url = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(product_id)
    .bind(&url)
    .fetch_one(&state.db)
    .await?;

    if let Some(old) = old_url {
        delete_image(&old).await;
    }

    Ok(ApiResponse::ok("Product image updated", product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(product_id): Path<Uuid>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let referenced: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(SELECT 1 FROM order_items WHERE product_id = $1)
            OR EXISTS(SELECT 1 FROM reviews WHERE product_id = $1)
        "#,
    )
    .bind(product_id)
    .fetch_one(&state.db)
    .await?;
    if referenced {
        return Err(AppError::Conflict(
            "product has orders or reviews; unpublish it instead".to_string(),
        ));
    }

    let image_url: Option<Option<String>> =
        sqlx::query_scalar("SELECT image_url FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&state.db)
            .await?;
    let image_url =
        image_url.ok_or_else(|| AppError::NotFound(format!("product {product_id} does not exist")))?;

    sqlx::query("DELETE FROM cart_items WHERE product_id = $1")
        .bind(product_id)
        .execute(&state.db)
        .await?;
    sqlx::query("DELETE FROM wishlist_items WHERE product_id = $1")
        .bind(product_id)
        .execute(&state.db)
        .await?;
    sqlx::query("DELETE FROM product_variants WHERE product_id = $1")
        .bind(product_id)
        .execute(&state.db)
        .await?;
    sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(product_id)
        .execute(&state.db)
        .await?;

    if let Some(url) = image_url {
        delete_image(&url).await;
    }

    Ok(ApiResponse::ok("Product deleted", serde_json::json!(null)))
}

pub async fn add_variant(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(product_id): Path<Uuid>,
    Json(req): Json<CreateVariantRequest>,
) -> Result<ApiResponse<ProductVariant>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;
    validate_variant(&req)?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
        .bind(product_id)
        .fetch_one(&state.db)
        .await?;
    if !exists {
        return Err(AppError::NotFound(format!("product {product_id} does not exist")));
    }

    let variant = sqlx::query_as::<_, ProductVariant>(
        r#"
        INSERT INTO product_variants (id, product_id, sku, size, price, quantity)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(product_id)
    .bind(req.sku.trim())
    .bind(req.size.trim())
    .bind(req.price)
    .bind(req.quantity)
    .fetch_one(&state.db)
    .await?;

    Ok(ApiResponse::created("Variant added", variant))
}

#[derive(Debug, serde::Deserialize)]
pub struct UpdateVariantRequest {
    pub sku: Option<String>,
    pub size: Option<String>,
    pub price: Option<Decimal>,
}

pub async fn update_variant(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path((product_id, variant_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateVariantRequest>,
) -> Result<ApiResponse<ProductVariant>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    if let Some(price) = req.price {
        if price <= Decimal::ZERO {
            return Err(AppError::Validation("variant price must be positive".to_string()));
        }
    }

    let variant = sqlx::query_as::<_, ProductVariant>(
        r#"
        UPDATE product_variants
        SET sku = COALESCE($3, sku),
            size = COALESCE($4, size),
            price = COALESCE($5, price)
        WHERE id = $2 AND product_id = $1
        RETURNING *
        "#,
    )
    .bind(product_id)
    .bind(variant_id)
    .bind(req.sku.as_deref().map(str::trim))
    .bind(req.size.as_deref().map(str::trim))
    .bind(req.price)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| {
        AppError::NotFound(format!("variant {variant_id} does not belong to product {product_id}"))
    })?;

    Ok(ApiResponse::ok("Variant updated", variant))
}
