use axum::{extract::State, http::HeaderMap};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::get_current_user,
    models::{Order, ADMIN_ROLES},
    response::ApiResponse,
    AppState,
};

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
struct TopProduct {
    id: Uuid,
    name: String,
    sales: i32,
    stock: i32,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
struct MonthlyRevenue {
    month: DateTime<Utc>,
    revenue: Decimal,
    orders: i64,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
struct MonthlyExpense {
    month: NaiveDate,
    total: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewResponse {
    product_count: i64,
    order_count: i64,
    user_count: i64,
    review_count: i64,
    revenue: Decimal,
    expense_total: Decimal,
    recent_orders: Vec<Order>,
    top_products: Vec<TopProduct>,
    monthly_revenue: Vec<MonthlyRevenue>,
    monthly_expenses: Vec<MonthlyExpense>,
}

pub async fn overview(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
) -> Result<ApiResponse<OverviewResponse>, AppError> {
    let current = get_current_user(&headers, &cookies, &state.db).await?;
    current.require_role(ADMIN_ROLES)?;

    let product_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(&state.db)
        .await?;
    let order_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&state.db)
        .await?;
    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_active = true")
        .fetch_one(&state.db)
        .await?;
    let review_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews")
        .fetch_one(&state.db)
        .await?;

    let revenue: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_paid), 0) FROM orders WHERE status <> 'CANCELLED'",
    )
    .fetch_one(&state.db)
    .await?;
    let expense_total: Decimal =
        sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM expenses")
            .fetch_one(&state.db)
            .await?;

    let recent_orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders ORDER BY created_at DESC LIMIT 5",
    )
    .fetch_all(&state.db)
    .await?;

    let top_products = sqlx::query_as::<_, TopProduct>(
        "SELECT id, name, sales, stock FROM products ORDER BY sales DESC, name LIMIT 5",
    )
    .fetch_all(&state.db)
    .await?;

    let monthly_revenue = sqlx::query_as::<_, MonthlyRevenue>(
        r#"
        SELECT date_trunc('month', created_at) AS month,
               COALESCE(SUM(amount_paid), 0) AS revenue,
               COUNT(*) AS orders
        FROM orders
        WHERE status <> 'CANCELLED' AND created_at >= NOW() - INTERVAL '12 months'
        GROUP BY 1
        ORDER BY 1
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    let monthly_expenses = sqlx::query_as::<_, MonthlyExpense>(
        r#"
        SELECT (date_trunc('month', spent_at))::date AS month,
               COALESCE(SUM(amount), 0) AS total
        FROM expenses
        WHERE spent_at >= (NOW() - INTERVAL '12 months')::date
        GROUP BY 1
        ORDER BY 1
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(ApiResponse::ok(
        "Overview fetched",
        OverviewResponse {
            product_count,
            order_count,
            user_count,
            review_count,
            revenue,
            expense_total,
            recent_orders,
            top_products,
            monthly_revenue,
            monthly_expenses,
        },
    ))
}
