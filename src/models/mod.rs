pub mod blog;
pub mod cart;
pub mod catalog;
pub mod expense;
pub mod order;
pub mod product;
pub mod review;
pub mod stock;
pub mod user;
pub mod wishlist;

pub use blog::{Blog, CreateBlogRequest, UpdateBlogRequest};
pub use cart::{AddToCartRequest, CartItem, CartItemDetail, UpdateCartItemRequest, STATUS_IN_CART};
pub use catalog::{normalize_name, Category, CreateNameRequest, Fragrance, Material};
pub use expense::{CreateExpenseRequest, Expense, UpdateExpenseRequest};
pub use order::{
    NewOrder, Order, OrderDetail, OrderItem, OrderItemSnapshot, UpdateOrderStatusRequest,
    ORDER_STATUSES,
};
pub use product::{
    CreateProductRequest, CreateVariantRequest, Product, ProductDetail, ProductVariant,
    UpdateProductRequest, VariantWithProduct,
};
pub use review::{CreateReviewRequest, Review, ReviewWithAuthor, UpdateReviewRequest};
pub use stock::{AddStockRequest, StockLog};
pub use user::{
    LoginRequest, RegisterRequest, Role, UpdateProfileRequest, UpdateRoleRequest, User,
    UserResponse, ADMIN_ROLES, STAFF_ROLES,
};
pub use wishlist::{AddToWishlistRequest, WishlistEntry, WishlistItem};
