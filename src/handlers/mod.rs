pub mod auth;
pub mod blogs;
pub mod cart;
pub mod categories;
pub mod checkout;
pub mod contact;
pub mod expenses;
pub mod fragrances;
pub mod materials;
pub mod orders;
pub mod overview;
pub mod products;
pub mod reviews;
pub mod stock;
pub mod wishlist;
