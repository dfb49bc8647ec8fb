use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::json;
use std::collections::HashMap;
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::get_current_user,
    models::{
        LoginRequest, RegisterRequest, Role, UpdateProfileRequest, UpdateRoleRequest, User,
        UserResponse, ADMIN_ROLES,
    },
    query::{FilterField, ListOptions, ListQuery, SortField},
    response::ApiResponse,
    utils::{create_token, hash_password, verify_password},
    AppState,
};

const AUTH_COOKIE: &str = "auth_token";

const USER_LIST: ListOptions = ListOptions {
    filterable: &[
        // role is a Postgres enum; compare it as text
        FilterField::text("role", "role::text"),
        FilterField::boolean("isActive", "is_active"),
    ],
    searchable: &["name", "email"],
    sortable: &[
        SortField::new("createdAt", "created_at"),
        SortField::new("name", "name"),
        SortField::new("email", "email"),
    ],
    selectable: &["id", "email", "name", "role", "phone", "address", "imageUrl", "isActive", "createdAt"],
};

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<ApiResponse<UserResponse>, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }
    if !req.email.contains('@') {
        return Err(AppError::Validation("a valid email is required".to_string()));
    }
    if req.password.len() < 6 {
        return Err(AppError::Validation(
            "password must be at least 6 characters".to_string(),
        ));
    }
    let email = req.email.trim().to_lowercase();

    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(&state.db)
        .await?;
    if taken {
        return Err(AppError::Conflict(format!(
            "an account with email {email} already exists"
        )));
    }

    let password_hash = hash_password(&req.password)
        .map_err(|e| AppError::Internal(format!("could not hash password: {e}")))?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, password_hash, name, role, phone, address, is_active, created_at, updated_at)
        VALUES ($1, $2, $3, $4, 'USER', $5, $6, true, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(&password_hash)
    .bind(req.name.trim())
    .bind(&req.phone)
    .bind(&req.address)
    .fetch_one(&state.db)
    .await?;

    Ok(ApiResponse::created("Account created", user.into()))
}

pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(req): Json<LoginRequest>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    let email = req.email.trim().to_lowercase();
    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE email = $1 AND is_active = true",
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::Unauthorized("invalid email or password".to_string()))?;

    if !verify_password(&req.password, &user.password_hash).unwrap_or(false) {
        return Err(AppError::Unauthorized("invalid email or password".to_string()));
    }

    let token = create_token(user.id, user.email.clone())
        .map_err(|e| AppError::Internal(format!("could not issue token: {e}")))?;

    let cookie = Cookie::build((AUTH_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::hours(24))
        .build();
    cookies.add(cookie);

    Ok(ApiResponse::ok(
        "Logged in",
        json!({ "token": token, "user": UserResponse::from(user) }),
    ))
}

pub async fn logout(cookies: Cookies) -> ApiResponse<serde_json::Value> {
    cookies.remove(Cookie::from(AUTH_COOKIE));
    ApiResponse::ok("Logged out", json!(null))
}

pub async fn me(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
) -> Result<ApiResponse<UserResponse>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(current.id)
        .fetch_one(&state.db)
        .await?;
    Ok(ApiResponse::ok("Profile fetched", user.into()))
}

pub async fn update_profile(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<ApiResponse<UserResponse>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;

    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(AppError::Validation("name cannot be empty".to_string()));
        }
    }

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET name = COALESCE($2, name),
            phone = COALESCE($3, phone),
            address = COALESCE($4, address),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(current.id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.phone)
    .bind(&req.address)
    .fetch_one(&state.db)
    .await?;

    Ok(ApiResponse::ok("Profile updated", user.into()))
}

pub async fn list_users(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<ApiResponse<Vec<serde_json::Value>>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let q = ListQuery::parse(&params, &USER_LIST)?;
    let users: Vec<User> = q.build_select("users").build_query_as().fetch_all(&state.db).await?;
    let total = q.fetch_total(&state.db, "users").await?;
    let meta = q.meta(total);
    Ok(ApiResponse::list("Users fetched", q.project(users), meta))
}

pub async fn update_role(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<ApiResponse<UserResponse>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(&[Role::SuperAdmin])?;
    if current.id == user_id {
        return Err(AppError::Validation("you cannot change your own role".to_string()));
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(user_id)
    .bind(req.role)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("user {user_id} does not exist")))?;

    Ok(ApiResponse::ok("Role updated", user.into()))
}

pub async fn deactivate_user(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<ApiResponse<UserResponse>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(&[Role::SuperAdmin])?;
    if current.id == user_id {
        return Err(AppError::Validation("you cannot deactivate yourself".to_string()));
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET is_active = false, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("user {user_id} does not exist")))?;

    Ok(ApiResponse::ok("Account deactivated", user.into()))
}
