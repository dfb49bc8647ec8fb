use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::get_current_user,
    models::{CreateExpenseRequest, Expense, UpdateExpenseRequest, STAFF_ROLES},
    query::{FilterField, FilterValue, ListOptions, ListQuery, SortField},
    response::ApiResponse,
    AppState,
};

const EXPENSE_LIST: ListOptions = ListOptions {
    filterable: &[
        FilterField::text("category", "category"),
        FilterField::date("spentAt", "spent_at"),
    ],
    searchable: &["title", "note"],
    sortable: &[
        SortField::new("createdAt", "created_at"),
        SortField::new("spentAt", "spent_at"),
        SortField::new("amount", "amount"),
    ],
    selectable: &["id", "title", "amount", "category", "note", "spentAt", "createdBy", "createdAt"],
};

fn parse_date(raw: &str, param: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("'{param}' must be YYYY-MM-DD")))
}

pub async fn list_expenses(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<ApiResponse<Vec<serde_json::Value>>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(STAFF_ROLES)?;

    // Date-window params are range conditions, not equality filters, so
    // they are peeled off before the builder sees the map.
    let mut params = params;
    let date_from = params.remove("dateFrom");
    let date_to = params.remove("dateTo");

    let mut q = ListQuery::parse(&params, &EXPENSE_LIST)?;
    if let Some(raw) = &date_from {
        q.and_gte("spent_at", FilterValue::Date(parse_date(raw, "dateFrom")?));
    }
    if let Some(raw) = &date_to {
        q.and_lte("spent_at", FilterValue::Date(parse_date(raw, "dateTo")?));
    }

    let expenses: Vec<Expense> =
        q.build_select("expenses").build_query_as().fetch_all(&state.db).await?;
    let total = q.fetch_total(&state.db, "expenses").await?;
    let meta = q.meta(total);
    Ok(ApiResponse::list("Expenses fetched", q.project(expenses), meta))
}

pub async fn create_expense(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Json(req): Json<CreateExpenseRequest>,
) -> Result<ApiResponse<Expense>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(STAFF_ROLES)?;

    if req.title.trim().is_empty() {
        return Err(AppError::Validation("expense title is required".to_string()));
    }
    if req.amount <= Decimal::ZERO {
        return Err(AppError::Validation("amount must be positive".to_string()));
    }
    if req.category.trim().is_empty() {
        return Err(AppError::Validation("category is required".to_string()));
    }

    let expense = sqlx::query_as::<_, Expense>(
        r#"
        INSERT INTO expenses (id, title, amount, category, note, spent_at, created_by, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(req.title.trim())
    .bind(req.amount)
    .bind(req.category.trim())
    .bind(&req.note)
    .bind(req.spent_at)
    .bind(current.id)
    .fetch_one(&state.db)
    .await?;

    Ok(ApiResponse::created("Expense created", expense))
}

pub async fn update_expense(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(expense_id): Path<Uuid>,
    Json(req): Json<UpdateExpenseRequest>,
) -> Result<ApiResponse<Expense>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(STAFF_ROLES)?;

    if let Some(amount) = req.amount {
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation("amount must be positive".to_string()));
        }
    }

    let expense = sqlx::query_as::<_, Expense>(
        r#"
        UPDATE expenses
        SET title = COALESCE($2, title),
            amount = COALESCE($3, amount),
            category = COALESCE($4, category),
            note = COALESCE($5, note),
            spent_at = COALESCE($6, spent_at),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(expense_id)
    .bind(req.title.as_deref().map(str::trim))
    .bind(req.amount)
    .bind(req.category.as_deref().map(str::trim))
    .bind(&req.note)
    .bind(req.spent_at)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("expense {expense_id} does not exist")))?;

    Ok(ApiResponse::ok("Expense updated", expense))
}

pub async fn delete_expense(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(expense_id): Path<Uuid>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(STAFF_ROLES)?;

    let deleted = sqlx::query("DELETE FROM expenses WHERE id = $1")
        .bind(expense_id)
        .execute(&state.db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("expense {expense_id} does not exist")));
    }

    Ok(ApiResponse::ok("Expense deleted", serde_json::json!(null)))
}
