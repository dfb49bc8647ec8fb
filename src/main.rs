mod database;
mod error;
mod handlers;
mod mailer;
mod middleware;
mod models;
mod payments;
mod query;
mod response;
mod services;
mod utils;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
    Json, Router,
};
use dotenvy::dotenv;
use std::env;
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use database::{create_database_pool, Database};
use mailer::Mailer;
use payments::PaymentClient;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub payments: PaymentClient,
    pub mailer: Mailer,
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let db = create_database_pool(&database_url)
        .await
        .expect("Failed to connect to database");

    let state = AppState {
        db,
        payments: PaymentClient::from_env(),
        mailer: Mailer::from_env(),
    };

    let app = create_router(state);

    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);
    log::info!("arome server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "service": "arome" }))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Auth
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route(
            "/api/auth/me",
            get(handlers::auth::me).patch(handlers::auth::update_profile),
        )
        // User administration
        .route("/api/users", get(handlers::auth::list_users))
        .route("/api/users/:id/role", patch(handlers::auth::update_role))
        .route("/api/users/:id/deactivate", post(handlers::auth::deactivate_user))
        // Catalog
        .route(
            "/api/products",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
        .route(
            "/api/products/:id",
            get(handlers::products::get_product)
                .patch(handlers::products::update_product)
                .delete(handlers::products::delete_product),
        )
        .route("/api/products/:id/image", post(handlers::products::upload_product_image))
        .route("/api/products/:id/variants", post(handlers::products::add_variant))
        .route(
            "/api/products/:id/variants/:variant_id",
            patch(handlers::products::update_variant),
        )
        .route("/api/products/:id/reviews", get(handlers::reviews::list_product_reviews))
        .route(
            "/api/categories",
            get(handlers::categories::list_categories).post(handlers::categories::create_category),
        )
        .route(
            "/api/categories/:id",
            patch(handlers::categories::update_category)
                .delete(handlers::categories::delete_category),
        )
        .route(
            "/api/materials",
            get(handlers::materials::list_materials).post(handlers::materials::create_material),
        )
        .route(
            "/api/materials/:id",
            patch(handlers::materials::update_material)
                .delete(handlers::materials::delete_material),
        )
        .route(
            "/api/fragrances",
            get(handlers::fragrances::list_fragrances).post(handlers::fragrances::create_fragrance),
        )
        .route(
            "/api/fragrances/:id",
            patch(handlers::fragrances::update_fragrance)
                .delete(handlers::fragrances::delete_fragrance),
        )
        // Cart and checkout
        .route(
            "/api/cart",
            get(handlers::cart::list_cart)
                .post(handlers::cart::add_to_cart)
                .delete(handlers::cart::clear_cart),
        )
        .route(
            "/api/cart/:id",
            patch(handlers::cart::update_cart_item).delete(handlers::cart::remove_cart_item),
        )
        .route("/api/checkout", post(handlers::checkout::create_session))
        .route("/api/checkout/webhook", post(handlers::checkout::webhook))
        // Orders
        .route("/api/orders", get(handlers::orders::list_orders))
        .route("/api/orders/my", get(handlers::orders::my_orders))
        .route("/api/orders/:id", get(handlers::orders::get_order))
        .route("/api/orders/:id/status", patch(handlers::orders::update_order_status))
        // Inventory
        .route("/api/stock", post(handlers::stock::adjust_stock))
        .route("/api/stock/logs", get(handlers::stock::list_stock_logs))
        // Reviews
        .route("/api/reviews", post(handlers::reviews::create_review))
        .route("/api/reviews/my", get(handlers::reviews::my_reviews))
        .route(
            "/api/reviews/:id",
            patch(handlers::reviews::update_review).delete(handlers::reviews::delete_review),
        )
        .route("/api/reviews/:id/publish", patch(handlers::reviews::set_review_published))
        // Wishlist
        .route(
            "/api/wishlist",
            get(handlers::wishlist::list_wishlist).post(handlers::wishlist::add_to_wishlist),
        )
        .route("/api/wishlist/:product_id", delete(handlers::wishlist::remove_from_wishlist))
        // Expenses
        .route(
            "/api/expenses",
            get(handlers::expenses::list_expenses).post(handlers::expenses::create_expense),
        )
        .route(
            "/api/expenses/:id",
            patch(handlers::expenses::update_expense).delete(handlers::expenses::delete_expense),
        )
        // Blog
        .route(
            "/api/blogs",
            get(handlers::blogs::list_blogs).post(handlers::blogs::create_blog),
        )
        .route(
            "/api/blogs/:id",
            get(handlers::blogs::get_blog)
                .patch(handlers::blogs::update_blog)
                .delete(handlers::blogs::delete_blog),
        )
        .route("/api/blogs/:id/image", post(handlers::blogs::upload_blog_image))
        // Admin analytics and contact relay
        .route("/api/overview", get(handlers::overview::overview))
        .route("/api/contact", post(handlers::contact::contact))
        // Uploaded images
        .nest_service("/static", ServeDir::new("static"))
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CookieManagerLayer::new())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(10 * 1024 * 1024)), // 10MB
        )
        .with_state(state)
}
